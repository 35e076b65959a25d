//! crates/bookchat_core/src/annotations.rs
//!
//! The annotation controller for one open book. It owns the rendered content,
//! the in-memory annotation list and the selection toolbar, and keeps them
//! consistent with the annotation store. One controller is created when the book
//! view opens and dropped when the view closes.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::content::{ContentTree, NodeId};
use crate::domain::{Annotation, NewAnnotation};
use crate::highlight::{reapply_highlights, unwrap_marker, wrap_range, ReapplyReport};
use crate::offsets::{resolve_selection, trim_range, OffsetRange, Selection, SelectionError};
use crate::ports::{AnnotationStore, PortError};

/// How long a highlight glows after being picked from the side list.
pub const PULSE_DURATION: Duration = Duration::from_secs(2);

/// Side-list previews longer than this are cut with an ellipsis.
pub const PREVIEW_CHARS: usize = 120;

const TOOLBAR_HALF_WIDTH: f64 = 100.0;
const TOOLBAR_LIFT: f64 = 60.0;

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("no text is selected")]
    NothingSelected,
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("annotation {0} not found")]
    NotFound(Uuid),
    #[error("annotation store failed: {0}")]
    Store(PortError),
}

/// Viewport rectangle of the current selection, as reported by the view.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// The floating "highlight" control anchored above a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Toolbar {
    Hidden,
    Shown { x: f64, y: f64 },
}

/// One row of the side list.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    pub id: Uuid,
    pub preview: String,
    pub date: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingHighlight {
    range: OffsetRange,
    text: String,
}

pub struct AnnotationController {
    store: Arc<dyn AnnotationStore>,
    user_id: Uuid,
    book_id: Uuid,
    annotations: Vec<Annotation>,
    content: ContentTree,
    toolbar: Toolbar,
    pending: Option<PendingHighlight>,
    pulse: Option<(Uuid, Instant)>,
}

impl AnnotationController {
    /// Opens the annotation view for `book_id` on behalf of `user_id`.
    pub fn open(store: Arc<dyn AnnotationStore>, user_id: Uuid, book_id: Uuid) -> Self {
        Self {
            store,
            user_id,
            book_id,
            annotations: Vec::new(),
            content: ContentTree::new(),
            toolbar: Toolbar::Hidden,
            pending: None,
            pulse: None,
        }
    }

    pub fn book_id(&self) -> Uuid {
        self.book_id
    }

    pub fn content(&self) -> &ContentTree {
        &self.content
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn toolbar(&self) -> Toolbar {
        self.toolbar
    }

    /// Replaces the in-memory list with the store's current list.
    /// On failure the previous list is kept.
    pub async fn load(&mut self) -> Result<usize, AnnotationError> {
        let annotations = self
            .store
            .list_annotations(self.user_id, self.book_id)
            .await
            .map_err(|e| {
                warn!(book_id = %self.book_id, "Failed to load annotations: {}", e);
                AnnotationError::Store(e)
            })?;
        info!(book_id = %self.book_id, count = annotations.len(), "Loaded annotations");
        self.annotations = annotations;
        Ok(self.annotations.len())
    }

    /// Renders the book text from scratch and re-applies every known highlight.
    pub fn render_content(&mut self, book_text: &str) -> ReapplyReport {
        self.content = ContentTree::render(book_text);
        self.pending = None;
        self.toolbar = Toolbar::Hidden;
        self.reapply_highlights()
    }

    /// Renders the book, loads its annotations and highlights them.
    pub async fn open_book(&mut self, book_text: &str) -> Result<ReapplyReport, AnnotationError> {
        self.content = ContentTree::render(book_text);
        self.load().await?;
        Ok(self.reapply_highlights())
    }

    pub fn reapply_highlights(&mut self) -> ReapplyReport {
        let root = self.content.root();
        reapply_highlights(&mut self.content, root, &self.annotations)
    }

    /// Tracks the user's selection. The toolbar is shown only for a non-empty
    /// selection fully inside the book content; anything else hides it.
    pub fn select(&mut self, selection: Option<Selection>, bounds: Rect) -> Toolbar {
        match selection.map(|s| self.capture(&s)) {
            Some(Ok(pending)) => {
                self.pending = Some(pending);
                self.toolbar = Toolbar::Shown {
                    x: bounds.left + bounds.width / 2.0 - TOOLBAR_HALF_WIDTH,
                    y: bounds.top - TOOLBAR_LIFT,
                };
            }
            Some(Err(e)) => {
                debug!("Selection ignored: {}", e);
                self.hide_toolbar();
            }
            None => self.hide_toolbar(),
        }
        self.toolbar
    }

    /// A click anywhere outside the toolbar.
    pub fn hide_toolbar(&mut self) {
        self.toolbar = Toolbar::Hidden;
        self.pending = None;
    }

    fn capture(&self, selection: &Selection) -> Result<PendingHighlight, SelectionError> {
        let root = self.content.root();
        let range = resolve_selection(&self.content, root, selection)?;
        let (range, text) = trim_range(&self.content, root, range)?;
        Ok(PendingHighlight { range, text })
    }

    /// Persists the current selection and highlights it. The toolbar is hidden
    /// whatever the outcome; nothing is rendered unless the store accepted it.
    pub async fn create_highlight(&mut self) -> Result<Annotation, AnnotationError> {
        let pending = self.pending.take().ok_or(AnnotationError::NothingSelected)?;
        self.toolbar = Toolbar::Hidden;

        let request = NewAnnotation {
            book_id: self.book_id,
            text: pending.text,
            start_offset: pending.range.start,
            end_offset: pending.range.end,
        };
        let annotation = self
            .store
            .create_annotation(self.user_id, request)
            .await
            .map_err(|e| {
                warn!(book_id = %self.book_id, "Failed to save annotation: {}", e);
                AnnotationError::Store(e)
            })?;

        let root = self.content.root();
        if let Err(e) = wrap_range(&mut self.content, root, pending.range, annotation.id) {
            warn!(annotation_id = %annotation.id, "Saved highlight could not be rendered: {}", e);
        }
        self.annotations.push(annotation.clone());
        Ok(annotation)
    }

    /// Deletes an annotation from the store, then unwraps its marker.
    pub async fn delete_highlight(&mut self, annotation_id: Uuid) -> Result<(), AnnotationError> {
        match self.store.delete_annotation(self.user_id, annotation_id).await {
            Ok(()) => {}
            Err(PortError::NotFound(_)) => return Err(AnnotationError::NotFound(annotation_id)),
            Err(e) => {
                warn!(%annotation_id, "Failed to delete annotation: {}", e);
                return Err(AnnotationError::Store(e));
            }
        }

        if let Some(marker) = self.content.find_marker(annotation_id) {
            unwrap_marker(&mut self.content, marker);
        }
        self.annotations.retain(|a| a.id != annotation_id);
        if matches!(self.pulse, Some((id, _)) if id == annotation_id) {
            self.pulse = None;
        }
        Ok(())
    }

    /// The side list, most recent first.
    pub fn entries(&self) -> Vec<AnnotationEntry> {
        let mut entries: Vec<AnnotationEntry> = self
            .annotations
            .iter()
            .map(|a| AnnotationEntry {
                id: a.id,
                preview: preview(&a.text),
                date: a.timestamp.format("%b %-d, %Y").to_string(),
                timestamp: a.timestamp,
            })
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Picks a side-list entry: returns the marker to scroll into view and
    /// starts its pulse.
    pub fn focus(&mut self, annotation_id: Uuid, now: Instant) -> Option<NodeId> {
        let marker = self.content.find_marker(annotation_id)?;
        self.pulse = Some((annotation_id, now + PULSE_DURATION));
        Some(marker)
    }

    /// The annotation currently pulsing, if its pulse has not yet expired.
    pub fn pulsing(&self, now: Instant) -> Option<Uuid> {
        match self.pulse {
            Some((id, until)) if now < until => Some(id),
            _ => None,
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::offsets::locate;
    use async_trait::async_trait;
    use crate::ports::PortResult;

    const BOOK: &str = "The cat sat on the mat.\nA dog barked at the cat.";

    fn controller() -> (AnnotationController, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let controller = AnnotationController::open(store.clone(), Uuid::new_v4(), Uuid::new_v4());
        (controller, store)
    }

    /// Selects the plain-text range `[start, end)` the way a mouse drag would.
    fn select_range(controller: &mut AnnotationController, start: usize, end: usize) {
        let content = controller.content();
        let anchor = locate(content, content.root(), start).unwrap();
        let focus = locate(content, content.root(), end).unwrap();
        let selection = Selection::new(anchor, focus);
        controller.select(Some(selection), Rect { left: 300.0, top: 200.0, width: 80.0, height: 20.0 });
    }

    struct FailingStore;

    #[async_trait]
    impl AnnotationStore for FailingStore {
        async fn list_annotations(&self, _: Uuid, _: Uuid) -> PortResult<Vec<Annotation>> {
            Err(PortError::Unexpected("offline".into()))
        }
        async fn create_annotation(&self, _: Uuid, _: NewAnnotation) -> PortResult<Annotation> {
            Err(PortError::Unexpected("offline".into()))
        }
        async fn delete_annotation(&self, _: Uuid, _: Uuid) -> PortResult<()> {
            Err(PortError::Unexpected("offline".into()))
        }
    }

    #[tokio::test]
    async fn create_highlight_persists_and_wraps_selection() {
        let (mut controller, store) = controller();
        controller.render_content(BOOK);
        select_range(&mut controller, 3, 8);
        assert_eq!(controller.toolbar(), Toolbar::Shown { x: 240.0, y: 140.0 });

        let annotation = controller.create_highlight().await.unwrap();
        assert_eq!(annotation.text, "cat");
        assert_eq!((annotation.start_offset, annotation.end_offset), (4, 7));
        assert_eq!(controller.toolbar(), Toolbar::Hidden);
        assert_eq!(controller.annotations().len(), 1);

        let marker = controller.content().find_marker(annotation.id).unwrap();
        assert_eq!(controller.content().text_content(marker), "cat");

        let stored = store
            .list_annotations(annotation.user_id, controller.book_id())
            .await
            .unwrap();
        assert_eq!(stored, vec![annotation]);
    }

    #[tokio::test]
    async fn failed_save_leaves_content_untouched() {
        let mut controller = AnnotationController::open(Arc::new(FailingStore), Uuid::new_v4(), Uuid::new_v4());
        controller.render_content(BOOK);
        let before = controller.content().to_html();
        select_range(&mut controller, 4, 7);

        let result = controller.create_highlight().await;
        assert!(matches!(result, Err(AnnotationError::Store(_))));
        assert_eq!(controller.content().to_html(), before);
        assert_eq!(controller.toolbar(), Toolbar::Hidden);
        assert!(controller.annotations().is_empty());
    }

    #[tokio::test]
    async fn toolbar_hides_for_collapsed_or_outside_selections() {
        let (mut controller, _) = controller();
        controller.render_content(BOOK);
        select_range(&mut controller, 4, 7);
        assert!(matches!(controller.toolbar(), Toolbar::Shown { .. }));

        select_range(&mut controller, 5, 5);
        assert_eq!(controller.toolbar(), Toolbar::Hidden);

        select_range(&mut controller, 4, 7);
        controller.select(None, Rect::default());
        assert_eq!(controller.toolbar(), Toolbar::Hidden);
        assert!(matches!(
            controller.create_highlight().await,
            Err(AnnotationError::NothingSelected)
        ));
    }

    #[tokio::test]
    async fn delete_unwraps_exactly_one_marker() {
        let (mut controller, _) = controller();
        controller.render_content(BOOK);
        select_range(&mut controller, 4, 7);
        let cat = controller.create_highlight().await.unwrap();
        select_range(&mut controller, 19, 22);
        let mat = controller.create_highlight().await.unwrap();

        controller.delete_highlight(cat.id).await.unwrap();
        assert_eq!(controller.annotations().len(), 1);
        assert!(controller.content().find_marker(cat.id).is_none());
        assert!(controller.content().find_marker(mat.id).is_some());
        assert_eq!(controller.content().text_content(controller.content().root()), "The cat sat on the mat.A dog barked at the cat.");
    }

    #[tokio::test]
    async fn deleting_unknown_annotation_reports_not_found() {
        let (mut controller, _) = controller();
        controller.render_content(BOOK);
        select_range(&mut controller, 4, 7);
        controller.create_highlight().await.unwrap();
        let before = controller.content().to_html();

        let missing = Uuid::new_v4();
        let result = controller.delete_highlight(missing).await;
        assert!(matches!(result, Err(AnnotationError::NotFound(id)) if id == missing));
        assert_eq!(controller.content().to_html(), before);
        assert_eq!(controller.annotations().len(), 1);
    }

    #[tokio::test]
    async fn reopening_the_book_restores_highlights() {
        let (mut controller, store) = controller();
        controller.render_content(BOOK);
        select_range(&mut controller, 4, 7);
        let annotation = controller.create_highlight().await.unwrap();

        let mut reopened = AnnotationController::open(store, annotation.user_id, controller.book_id());
        let report = reopened.open_book(BOOK).await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(reopened.content().to_html(), controller.content().to_html());

        // A second pass over the same content is a no-op.
        let again = reopened.reapply_highlights();
        assert_eq!(again.already_present, 1);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_list() {
        let mut controller = AnnotationController::open(Arc::new(FailingStore), Uuid::new_v4(), Uuid::new_v4());
        assert!(controller.load().await.is_err());
        assert!(controller.annotations().is_empty());
    }

    #[tokio::test]
    async fn side_list_is_newest_first_and_focus_pulses() {
        let (mut controller, _) = controller();
        controller.render_content(BOOK);
        select_range(&mut controller, 4, 7);
        let older = controller.create_highlight().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        select_range(&mut controller, 19, 22);
        let newer = controller.create_highlight().await.unwrap();

        let entries = controller.entries();
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(entries[1].preview, "cat");

        let now = Instant::now();
        let marker = controller.focus(older.id, now).unwrap();
        assert_eq!(controller.content().find_marker(older.id), Some(marker));
        assert_eq!(controller.pulsing(now + Duration::from_millis(500)), Some(older.id));
        assert_eq!(controller.pulsing(now + PULSE_DURATION), None);
    }

    #[test]
    fn long_previews_are_truncated() {
        let long = "x".repeat(PREVIEW_CHARS + 10);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 1);
        assert!(cut.ends_with('…'));
    }
}
