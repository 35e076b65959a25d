pub mod chat_llm;
pub mod db;
pub mod extract;
pub mod retry;
pub mod tts;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use retry::RetryPolicy;
pub use tts::OpenAiSpeechAdapter;
