//! crates/bookchat_core/src/preferences.rs
//!
//! Reader state that lives on the client between visits: how far each book has
//! been scrolled and the colour theme.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const THEME_KEY: &str = "theme";

pub fn progress_key(book_id: Uuid) -> String {
    format!("reading-progress-{}", book_id)
}

/// String key/value persistence, as offered by browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

/// Scroll geometry of the book pane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    fn max_scroll(&self) -> f64 {
        self.scroll_height - self.client_height
    }
}

/// Percentage read, capped at 100. `None` when the whole book fits on screen
/// and the progress bar should be hidden.
pub fn scroll_percentage(metrics: ScrollMetrics) -> Option<f64> {
    if metrics.scroll_height <= metrics.client_height {
        return None;
    }
    Some((metrics.scroll_top / metrics.max_scroll() * 100.0).clamp(0.0, 100.0))
}

/// The scroll offset that puts the pane back at `percentage`.
pub fn restore_scroll_top(percentage: f64, metrics: ScrollMetrics) -> f64 {
    (percentage / 100.0) * metrics.max_scroll().max(0.0)
}

pub fn progress_label(percentage: f64) -> String {
    format!("{}% read", percentage.round())
}

pub struct ReaderPreferences<S: KeyValueStore> {
    storage: S,
}

impl<S: KeyValueStore> ReaderPreferences<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    /// The saved theme; anything unreadable falls back to dark.
    pub fn theme(&self) -> Theme {
        self.storage
            .get(THEME_KEY)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let theme = self.theme().toggled();
        self.storage.set(THEME_KEY, theme.to_string());
        theme
    }

    pub fn save_progress(&mut self, book_id: Uuid, percentage: f64) {
        self.storage
            .set(&progress_key(book_id), percentage.clamp(0.0, 100.0).to_string());
    }

    pub fn progress(&self, book_id: Uuid) -> Option<f64> {
        self.storage
            .get(&progress_key(book_id))
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|p| p.is_finite())
    }

    /// Records a scroll event and returns the percentage shown, if any.
    pub fn record_scroll(&mut self, book_id: Uuid, metrics: ScrollMetrics) -> Option<f64> {
        let percentage = scroll_percentage(metrics)?;
        self.save_progress(book_id, percentage);
        Some(percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(scroll_top: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            scroll_height: 1200.0,
            client_height: 200.0,
        }
    }

    #[test]
    fn theme_defaults_to_dark_and_toggles() {
        let mut prefs = ReaderPreferences::new(MemoryStorage::default());
        assert_eq!(prefs.theme(), Theme::Dark);
        assert_eq!(prefs.toggle_theme(), Theme::Light);
        assert_eq!(prefs.theme(), Theme::Light);

        let storage = prefs.into_inner();
        assert_eq!(storage.get(THEME_KEY).as_deref(), Some("light"));
    }

    #[test]
    fn unreadable_theme_falls_back_to_dark() {
        let mut storage = MemoryStorage::default();
        storage.set(THEME_KEY, "sepia".to_string());
        assert_eq!(ReaderPreferences::new(storage).theme(), Theme::Dark);
    }

    #[test]
    fn progress_is_saved_per_book() {
        let mut prefs = ReaderPreferences::new(MemoryStorage::default());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(prefs.record_scroll(a, metrics(250.0)), Some(25.0));
        assert_eq!(prefs.progress(a), Some(25.0));
        assert_eq!(prefs.progress(b), None);

        let storage = prefs.into_inner();
        assert_eq!(storage.get(&format!("reading-progress-{}", a)).as_deref(), Some("25"));
    }

    #[test]
    fn content_that_fits_shows_no_progress() {
        let mut prefs = ReaderPreferences::new(MemoryStorage::default());
        let fits = ScrollMetrics {
            scroll_top: 0.0,
            scroll_height: 200.0,
            client_height: 200.0,
        };
        let book = Uuid::new_v4();
        assert_eq!(prefs.record_scroll(book, fits), None);
        assert_eq!(prefs.progress(book), None);
    }

    #[test]
    fn percentage_is_capped_and_restorable() {
        assert_eq!(scroll_percentage(metrics(5000.0)), Some(100.0));
        assert_eq!(restore_scroll_top(40.0, metrics(0.0)), 400.0);
        assert_eq!(progress_label(33.4), "33% read");
    }
}
