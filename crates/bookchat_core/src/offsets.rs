//! crates/bookchat_core/src/offsets.rs
//!
//! Maps positions inside rendered book content to stable character offsets within
//! the book's plain text, and back. Offsets count characters across every
//! text-bearing descendant of the container, in document order.

use crate::content::{ContentTree, NodeId};

/// One end of a selection. For text nodes `offset` counts characters into the
/// text; for elements it is a child index, as in the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A user selection. `anchor` is where the drag started and may come after `focus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Boundary,
    pub focus: Boundary,
}

impl Selection {
    pub fn new(anchor: Boundary, focus: Boundary) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A half-open `[start, end)` character range of the plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRange {
    pub start: usize,
    pub end: usize,
}

impl OffsetRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("selection is collapsed")]
    Collapsed,
    #[error("selection lies outside the book content")]
    OutsideContainer,
    #[error("selection contains no text")]
    Empty,
}

/// Cumulative character count preceding `boundary` inside `container`.
///
/// Returns `None` when the boundary node is not inside the container.
pub fn text_offset(tree: &ContentTree, container: NodeId, boundary: Boundary) -> Option<usize> {
    if !tree.contains(container, boundary.node) {
        return None;
    }

    let mut before = 0usize;
    for node in std::iter::once(container).chain(tree.descendants(container)) {
        if node == boundary.node {
            return Some(match tree.text(node) {
                Some(_) => before + boundary.offset.min(tree.text_len(node)),
                None => before + text_before_child(tree, node, boundary.offset),
            });
        }
        before += tree.text_len(node);
    }
    None
}

/// Characters under `element` that precede its `index`-th child.
fn text_before_child(tree: &ContentTree, element: NodeId, index: usize) -> usize {
    tree.children(element)
        .iter()
        .take(index)
        .map(|&child| tree.text_content(child).chars().count())
        .sum()
}

/// Maps a plain-text offset back to a position inside a text node.
///
/// An offset on the seam between two runs resolves to the end of the earlier one.
/// Returns `None` when the offset lies past the end of the content.
pub fn locate(tree: &ContentTree, container: NodeId, offset: usize) -> Option<Boundary> {
    let mut before = 0usize;
    for node in tree.text_nodes(container) {
        let len = tree.text_len(node);
        if offset <= before + len {
            return Some(Boundary::new(node, offset - before));
        }
        before += len;
    }
    None
}

/// Resolves a selection to an ordered offset range inside `container`.
pub fn resolve_selection(
    tree: &ContentTree,
    container: NodeId,
    selection: &Selection,
) -> Result<OffsetRange, SelectionError> {
    if selection.is_collapsed() {
        return Err(SelectionError::Collapsed);
    }
    let anchor = text_offset(tree, container, selection.anchor)
        .ok_or(SelectionError::OutsideContainer)?;
    let focus = text_offset(tree, container, selection.focus)
        .ok_or(SelectionError::OutsideContainer)?;

    let range = OffsetRange {
        start: anchor.min(focus),
        end: anchor.max(focus),
    };
    if range.is_empty() {
        return Err(SelectionError::Collapsed);
    }
    Ok(range)
}

/// The plain text covered by `range`.
pub fn text_in_range(tree: &ContentTree, container: NodeId, range: OffsetRange) -> String {
    tree.text_content(container)
        .chars()
        .skip(range.start)
        .take(range.len())
        .collect()
}

/// Shrinks `range` so it neither starts nor ends with whitespace, returning the
/// trimmed text alongside it. Fails when nothing but whitespace was selected.
pub fn trim_range(
    tree: &ContentTree,
    container: NodeId,
    range: OffsetRange,
) -> Result<(OffsetRange, String), SelectionError> {
    let raw: Vec<char> = text_in_range(tree, container, range).chars().collect();
    let leading = raw.iter().take_while(|c| c.is_whitespace()).count();
    if leading == raw.len() {
        return Err(SelectionError::Empty);
    }
    let trailing = raw.iter().rev().take_while(|c| c.is_whitespace()).count();

    let trimmed = OffsetRange {
        start: range.start + leading,
        end: range.end - trailing,
    };
    let text = raw[leading..raw.len() - trailing].iter().collect();
    Ok((trimmed, text))
}
