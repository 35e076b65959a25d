//! crates/bookchat_core/src/highlight.rs
//!
//! Wraps and unwraps highlight markers in rendered book content.
//!
//! Re-application after a re-render matches annotations by their literal text,
//! not by offsets: re-rendering regenerates the markup, so stored offsets cannot
//! be trusted to point at the same nodes. Text that no longer appears verbatim is
//! skipped silently.

use tracing::debug;
use uuid::Uuid;

use crate::content::{ContentTree, NodeId, NodeKind};
use crate::domain::Annotation;
use crate::offsets::{locate, OffsetRange, SelectionError};

/// Outcome of one re-apply pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapplyReport {
    /// Markers created during this pass.
    pub applied: usize,
    /// Annotations whose marker was already in the content.
    pub already_present: usize,
    /// Annotations whose text was not found.
    pub missing: Vec<Uuid>,
}

/// Wraps the text covered by `range` in a marker tagged with `annotation_id`.
///
/// When the range stays inside one parent the covered runs are moved into the
/// marker. A range crossing paragraphs collapses into a single marker at its
/// start, holding the covered text, and the covered runs are removed elsewhere.
pub fn wrap_range(
    tree: &mut ContentTree,
    container: NodeId,
    range: OffsetRange,
    annotation_id: Uuid,
) -> Result<NodeId, SelectionError> {
    if range.is_empty() {
        return Err(SelectionError::Collapsed);
    }
    // Split the end first so the start boundary's node id survives.
    split_at_offset(tree, container, range.end);
    split_at_offset(tree, container, range.start);

    let covered = covered_text_nodes(tree, container, range);
    let (first, last) = match (covered.first(), covered.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(SelectionError::Empty),
    };
    let parent = tree.parent(first).ok_or(SelectionError::OutsideContainer)?;
    let index = tree
        .index_in_parent(first)
        .ok_or(SelectionError::OutsideContainer)?;

    let marker = tree.insert_child(parent, index, NodeKind::Highlight(annotation_id));
    if covered.iter().all(|&n| tree.parent(n) == Some(parent)) {
        let last_index = tree
            .index_in_parent(last)
            .ok_or(SelectionError::OutsideContainer)?;
        let moving: Vec<NodeId> = tree.children(parent)[index + 1..=last_index].to_vec();
        for (i, node) in moving.into_iter().enumerate() {
            tree.reparent(node, marker, i);
        }
    } else {
        let text: String = covered.iter().filter_map(|&n| tree.text(n)).collect();
        tree.append_text(marker, &text);
        for node in covered {
            tree.detach(node);
        }
    }
    Ok(marker)
}

/// Replaces a marker with its content. Markers nested inside it survive.
/// Returns `false` when `marker` is not an attached highlight marker.
pub fn unwrap_marker(tree: &mut ContentTree, marker: NodeId) -> bool {
    if !matches!(tree.kind(marker), NodeKind::Highlight(_)) {
        return false;
    }
    let (Some(parent), Some(index)) = (tree.parent(marker), tree.index_in_parent(marker)) else {
        return false;
    };
    let children = tree.children(marker).to_vec();
    for (i, child) in children.into_iter().enumerate() {
        tree.reparent(child, parent, index + 1 + i);
    }
    tree.detach(marker);
    tree.normalize(parent);
    true
}

/// Re-applies every annotation to freshly rendered content. Safe to call any
/// number of times: annotations that already have a marker are left alone.
///
/// Longer texts go first so a short annotation whose text also occurs inside a
/// longer one cannot fragment the longer match. Text already inside a marker is
/// never matched again.
pub fn reapply_highlights(
    tree: &mut ContentTree,
    container: NodeId,
    annotations: &[Annotation],
) -> ReapplyReport {
    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    ordered.sort_by_key(|a| std::cmp::Reverse(a.text.chars().count()));

    let mut report = ReapplyReport::default();
    for annotation in ordered {
        if tree.find_marker(annotation.id).is_some() {
            report.already_present += 1;
            continue;
        }
        match wrap_first_occurrence(tree, container, &annotation.text, annotation.id) {
            Some(_) => report.applied += 1,
            None => {
                debug!(annotation_id = %annotation.id, "Highlight text not found in content, skipping");
                report.missing.push(annotation.id);
            }
        }
    }
    report
}

fn wrap_first_occurrence(
    tree: &mut ContentTree,
    container: NodeId,
    needle: &str,
    annotation_id: Uuid,
) -> Option<NodeId> {
    if needle.is_empty() {
        return None;
    }
    let needle_len = needle.chars().count();

    for node in tree.text_nodes(container) {
        if tree.highlight_ancestor(node).is_some() {
            continue;
        }
        let Some(start) = tree
            .text(node)
            .and_then(|text| text.find(needle).map(|pos| text[..pos].chars().count()))
        else {
            continue;
        };

        let target = tree.split_text(node, start).unwrap_or(node);
        tree.split_text(target, needle_len);
        let parent = tree.parent(target)?;
        let index = tree.index_in_parent(target)?;
        let marker = tree.insert_child(parent, index, NodeKind::Highlight(annotation_id));
        tree.reparent(target, marker, 0);
        return Some(marker);
    }
    None
}

fn split_at_offset(tree: &mut ContentTree, container: NodeId, offset: usize) {
    if let Some(boundary) = locate(tree, container, offset) {
        tree.split_text(boundary.node, boundary.offset);
    }
}

/// Non-empty text runs lying entirely inside `range`, in document order.
fn covered_text_nodes(tree: &ContentTree, container: NodeId, range: OffsetRange) -> Vec<NodeId> {
    let mut covered = Vec::new();
    let mut start = 0usize;
    for node in tree.text_nodes(container) {
        let end = start + tree.text_len(node);
        if end > start && start >= range.start && end <= range.end {
            covered.push(node);
        }
        start = end;
    }
    covered
}
