//! crates/bookchat_core/src/content.rs
//!
//! The rendered book content: a small DOM-like tree of paragraphs, text runs and
//! highlight markers. The book's plain text is re-rendered from scratch every time
//! the book view is opened, so node ids are only stable between mutations.

use uuid::Uuid;

/// Index of a node inside a [`ContentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Paragraph,
    /// A highlight marker tagged with the annotation it renders.
    Highlight(Uuid),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed content tree. Removed nodes stay in the arena but are detached
/// from the root, so they are invisible to every traversal.
#[derive(Debug, Clone)]
pub struct ContentTree {
    nodes: Vec<Node>,
}

const EMPTY_BOOK_MESSAGE: &str = "No book content available. Please upload a .txt or .pdf file.";
const HIGHLIGHT_TOOLTIP: &str = "Click to view note";

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTree {
    /// Creates a tree holding only the root container.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Renders plain book text into one paragraph per non-blank line.
    pub fn render(book_text: &str) -> Self {
        let mut tree = Self::new();
        for line in book_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            tree.append_paragraph(line);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Character length of a text node; zero for elements.
    pub fn text_len(&self, id: NodeId) -> usize {
        self.text(id).map(|t| t.chars().count()).unwrap_or(0)
    }

    /// Appends a paragraph with a single text run to the root.
    pub fn append_paragraph(&mut self, text: &str) -> NodeId {
        let root = self.root();
        let paragraph = self.push_child(root, NodeKind::Paragraph);
        self.push_child(paragraph, NodeKind::Text(text.to_string()));
        paragraph
    }

    /// Appends a text run under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push_child(parent, NodeKind::Text(text.to_string()))
    }

    /// Appends an (initially empty) highlight marker under `parent`.
    pub fn append_marker(&mut self, parent: NodeId, annotation_id: Uuid) -> NodeId {
        self.push_child(parent, NodeKind::Highlight(annotation_id))
    }

    /// All descendants of `id` in document (pre-)order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Text-bearing descendants of `container`, in document order.
    pub fn text_nodes(&self, container: NodeId) -> Vec<NodeId> {
        self.descendants(container)
            .into_iter()
            .filter(|&n| self.text(n).is_some())
            .collect()
    }

    /// Concatenated text of every text node under (or at) `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.text_nodes(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Inclusive containment, like the DOM's `Node.contains`.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// The nearest highlight marker enclosing `node`, if any.
    pub fn highlight_ancestor(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.parent(node);
        while let Some(n) = current {
            if matches!(self.kind(n), NodeKind::Highlight(_)) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Finds the attached marker tagged with `annotation_id`.
    pub fn find_marker(&self, annotation_id: Uuid) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| self.kind(n) == &NodeKind::Highlight(annotation_id))
    }

    /// Every attached marker with its annotation id, in document order.
    pub fn markers(&self) -> Vec<(Uuid, NodeId)> {
        self.descendants(self.root())
            .into_iter()
            .filter_map(|n| match self.kind(n) {
                NodeKind::Highlight(id) => Some((*id, n)),
                _ => None,
            })
            .collect()
    }

    /// Serializes the tree to the markup the book view displays.
    pub fn to_html(&self) -> String {
        if self.is_empty() {
            return format!("<p class=\"empty\">{}</p>", EMPTY_BOOK_MESSAGE);
        }
        let mut out = String::new();
        self.write_html(self.root(), &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Root => self.write_children(id, out),
            NodeKind::Paragraph => {
                out.push_str("<p>");
                self.write_children(id, out);
                out.push_str("</p>");
            }
            NodeKind::Highlight(annotation_id) => {
                out.push_str(&format!(
                    "<span class=\"highlight\" data-annotation-id=\"{}\">",
                    annotation_id
                ));
                self.write_children(id, out);
                out.push_str(&format!(
                    "<div class=\"highlight-tooltip\">{}</div></span>",
                    HIGHLIGHT_TOOLTIP
                ));
            }
            NodeKind::Text(text) => out.push_str(&escape_html(text)),
        }
    }

    fn write_children(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            self.write_html(child, out);
        }
    }

    //=====================================================================================
    // Mutation primitives (used by the highlight renderer)
    //=====================================================================================

    fn push_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let index = self.children(parent).len();
        self.insert_child(parent, index, kind)
    }

    pub(crate) fn insert_child(&mut self, parent: NodeId, index: usize, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, id);
        id
    }

    pub(crate) fn index_in_parent(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|&c| c == node)
    }

    /// Removes `node` from its parent. The subtree stays intact but unreachable.
    pub(crate) fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    /// Moves `node` (with its subtree) to `new_parent` at `index`.
    pub(crate) fn reparent(&mut self, node: NodeId, new_parent: NodeId, index: usize) {
        self.detach(node);
        self.nodes[node.0].parent = Some(new_parent);
        let children = &mut self.nodes[new_parent.0].children;
        let index = index.min(children.len());
        children.insert(index, node);
    }

    /// Splits a text node at character `at`, keeping the head in place and
    /// inserting the tail as the next sibling. Returns the tail, or `None` when
    /// `at` falls on either edge (no split needed).
    pub(crate) fn split_text(&mut self, node: NodeId, at: usize) -> Option<NodeId> {
        let text = self.text(node)?.to_string();
        let len = text.chars().count();
        if at == 0 || at >= len {
            return None;
        }
        let split = byte_index(&text, at);
        let (head, tail) = text.split_at(split);
        let (parent, index) = (self.parent(node)?, self.index_in_parent(node)?);
        self.nodes[node.0].kind = NodeKind::Text(head.to_string());
        Some(self.insert_child(parent, index + 1, NodeKind::Text(tail.to_string())))
    }

    /// Merges adjacent text children of `parent` and drops empty ones.
    pub(crate) fn normalize(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        let mut previous_text: Option<NodeId> = None;
        for child in children {
            match self.text(child).map(str::to_string) {
                Some(text) if text.is_empty() => self.detach(child),
                Some(text) => match previous_text {
                    Some(prev) => {
                        if let NodeKind::Text(existing) = &mut self.nodes[prev.0].kind {
                            existing.push_str(&text);
                        }
                        self.detach(child);
                    }
                    None => previous_text = Some(child),
                },
                None => previous_text = None,
            }
        }
    }
}

/// Byte index of the `char_index`-th character (or the string length past the end).
pub(crate) fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_makes_one_paragraph_per_non_blank_line() {
        let tree = ContentTree::render("  First line  \n\n   \nSecond <line>\n");
        assert_eq!(tree.children(tree.root()).len(), 2);
        assert_eq!(tree.text_content(tree.root()), "First lineSecond <line>");
        assert_eq!(tree.to_html(), "<p>First line</p><p>Second &lt;line&gt;</p>");
    }

    #[test]
    fn empty_book_renders_placeholder() {
        let tree = ContentTree::render("\n  \n");
        assert!(tree.is_empty());
        assert!(tree.to_html().contains("No book content available"));
    }

    #[test]
    fn split_and_normalize_restore_the_original_run() {
        let mut tree = ContentTree::render("héllo world");
        let text = tree.text_nodes(tree.root())[0];
        let tail = tree.split_text(text, 2).unwrap();
        assert_eq!(tree.text(text), Some("hé"));
        assert_eq!(tree.text(tail), Some("llo world"));
        assert!(tree.split_text(text, 0).is_none());
        assert!(tree.split_text(text, 2).is_none());

        let paragraph = tree.parent(text).unwrap();
        tree.normalize(paragraph);
        assert_eq!(tree.text_nodes(tree.root()).len(), 1);
        assert_eq!(tree.to_html(), "<p>héllo world</p>");
    }

    #[test]
    fn detached_nodes_are_invisible() {
        let mut tree = ContentTree::render("a\nb");
        let second = tree.children(tree.root())[1];
        tree.detach(second);
        assert_eq!(tree.text_content(tree.root()), "a");
        assert!(!tree.contains(tree.root(), second));
    }

    #[test]
    fn markers_are_found_by_annotation_id() {
        let mut tree = ContentTree::new();
        let paragraph = tree.append_paragraph("before ");
        let id = Uuid::new_v4();
        let marker = tree.append_marker(paragraph, id);
        let inner = tree.append_text(marker, "marked");
        assert_eq!(tree.find_marker(id), Some(marker));
        assert_eq!(tree.highlight_ancestor(inner), Some(marker));
        assert_eq!(tree.markers(), vec![(id, marker)]);
        assert!(tree.to_html().contains(&format!("data-annotation-id=\"{}\">marked<div", id)));
    }
}
