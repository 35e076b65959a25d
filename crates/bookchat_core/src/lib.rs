pub mod annotations;
pub mod content;
pub mod domain;
pub mod highlight;
pub mod memory;
pub mod offsets;
pub mod playback;
pub mod ports;
pub mod preferences;
pub mod speech;

pub use domain::{
    Annotation, AuthSession, Book, BookContent, BookSummary, ChatMessage, ChatRequest,
    ConversationTurn, NewAnnotation, Sender, SynthesizedSpeech, User, UserCredentials,
};
pub use ports::{
    AnnotationStore, BookChatService, DatabaseService, PortError, PortResult,
    SpeechSynthesisService,
};
