//! Backend-neutral document tree produced by the renderer.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub nodes: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(Heading),
    Paragraph(Vec<Inline>),
    Table(Table),
    CodeBlock { language: Option<String>, code: String },
    List(Vec<ListItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub level: u8,
    /// Plain heading text, used for the table of contents.
    pub text: String,
    /// Link target emitted with the heading. `None` in pure mode.
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Vec<Inline>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub content: Vec<Inline>,
    pub children: Vec<ListItem>,
}

impl ListItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Inline::Text(text.into())],
            children: vec![],
        }
    }
}

/// Inline content of a cell, list item or paragraph.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Strong(String),
    /// Link to an anchor inside the document.
    InternalLink { text: String, anchor: String },
    /// Link to an outside URL.
    ExternalLink { text: String, url: String },
    /// Small highlighted label, e.g. the primary key marker.
    Badge(String),
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

impl Document {
    pub fn push(&mut self, block: Block) {
        self.nodes.push(block);
    }

    pub fn headings(&self) -> impl Iterator<Item = &Heading> {
        self.nodes.iter().filter_map(|b| match b {
            Block::Heading(h) => Some(h),
            _ => None,
        })
    }
}
