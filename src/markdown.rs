//! Serializer for converting a document tree to Markdown text.

use crate::document::{Block, Document, Heading, Inline, ListItem, Table};
use crate::measure::display_width;

const BADGE_STYLE: &str = "background: #ddd; padding: 2px; font-size: 0.75rem; color: black";

/// Serialize a document to GitHub-flavored Markdown.
pub fn serialize(doc: &Document) -> String {
    let blocks: Vec<String> = doc.nodes.iter().map(serialize_block).collect();
    if blocks.is_empty() {
        return String::new();
    }
    let mut output = blocks.join("\n\n");
    output.push('\n');
    output
}

fn serialize_block(block: &Block) -> String {
    match block {
        Block::Heading(heading) => serialize_heading(heading),
        Block::Paragraph(inlines) => serialize_inlines(inlines),
        Block::Table(table) => serialize_table(table),
        Block::CodeBlock { language, code } => serialize_code_block(language.as_deref(), code),
        Block::List(items) => {
            let mut output = String::new();
            serialize_list(&mut output, items, 0);
            output.truncate(output.trim_end().len());
            output
        }
    }
}

fn serialize_heading(heading: &Heading) -> String {
    let hashes = "#".repeat(heading.level.clamp(1, 6) as usize);
    match &heading.anchor {
        Some(anchor) => format!(
            "{} <a name=\"{}\"></a>{}",
            hashes,
            escape_attribute(anchor),
            heading.text
        ),
        None => format!("{} {}", hashes, heading.text),
    }
}

fn serialize_inline(inline: &Inline) -> String {
    match inline {
        Inline::Text(text) => text.clone(),
        Inline::Strong(text) => format!("**{}**", text),
        Inline::InternalLink { text, anchor } => format!(
            "[{}](#{})",
            text.replace('[', "\\[").replace(']', "\\]"),
            encode_fragment(anchor)
        ),
        Inline::ExternalLink { text, url } => {
            format!("<a href=\"{}\">{}</a>", escape_attribute(url), text)
        }
        Inline::Badge(text) => format!("<span style=\"{}\">{}</span>", BADGE_STYLE, text),
    }
}

fn escape_attribute(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Percent-encode an anchor for use after `#` in a link destination.
/// Browsers decode the fragment before matching it against `name`.
fn encode_fragment(anchor: &str) -> String {
    let mut encoded = String::with_capacity(anchor.len());
    for c in anchor.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') || !c.is_ascii() {
            encoded.push(c);
        } else {
            encoded.push_str(&format!("%{:02X}", c as u32));
        }
    }
    encoded
}

fn serialize_inlines(inlines: &[Inline]) -> String {
    inlines.iter().map(serialize_inline).collect()
}

/// Cell text with pipes escaped and line breaks flattened.
fn serialize_cell(inlines: &[Inline]) -> String {
    serialize_inlines(inlines)
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

fn serialize_table(table: &Table) -> String {
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| serialize_cell(cell)).collect())
        .collect();

    let columns = table.headers.len();
    let mut widths: Vec<usize> = table.headers.iter().map(|h| display_width(h).max(3)).collect();
    for row in &rows {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(table_line(table.headers.iter().map(String::as_str), &widths));
    let separators: Vec<String> = widths
        .iter()
        .map(|w| format!(":{}", "-".repeat(w - 1)))
        .collect();
    lines.push(table_line(separators.iter().map(String::as_str), &widths));
    for row in &rows {
        let cells = (0..columns).map(|i| row.get(i).map(String::as_str).unwrap_or(""));
        lines.push(table_line(cells, &widths));
    }

    lines.join("\n")
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (cell, width) in cells.zip(widths) {
        let padding = width.saturating_sub(display_width(cell));
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(padding));
        line.push_str(" |");
    }
    line
}

fn serialize_code_block(language: Option<&str>, code: &str) -> String {
    // The fence must be longer than any backtick run inside the code.
    let longest_run = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest_run + 1).max(3));
    format!(
        "{}{}\n{}\n{}",
        fence,
        language.unwrap_or(""),
        code.trim_end_matches('\n'),
        fence
    )
}

fn serialize_list(output: &mut String, items: &[ListItem], depth: usize) {
    for item in items {
        output.push_str(&"  ".repeat(depth));
        output.push_str("- ");
        output.push_str(&serialize_inlines(&item.content));
        output.push('\n');
        serialize_list(output, &item.children, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(level: u8, text: &str, anchor: Option<&str>) -> Block {
        Block::Heading(Heading {
            level,
            text: text.to_string(),
            anchor: anchor.map(str::to_string),
        })
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(serialize(&Document::default()), "");
    }

    #[test]
    fn test_heading_with_anchor() {
        let doc = Document {
            nodes: vec![heading(3, "User Accounts", Some("user-accounts"))],
        };
        assert_eq!(
            serialize(&doc),
            "### <a name=\"user-accounts\"></a>User Accounts\n"
        );
    }

    #[test]
    fn test_heading_without_anchor() {
        let doc = Document {
            nodes: vec![heading(2, "Tables", None)],
        };
        assert_eq!(serialize(&doc), "## Tables\n");
    }

    #[test]
    fn test_table_is_padded() {
        let doc = Document {
            nodes: vec![Block::Table(Table {
                headers: vec!["Name".to_string(), "Type".to_string()],
                rows: vec![
                    vec![vec![Inline::text("id")], vec![Inline::text("integer")]],
                    vec![vec![Inline::text("name")], vec![Inline::text("text")]],
                ],
            })],
        };
        insta::assert_snapshot!(serialize(&doc), @r"
        | Name | Type    |
        | :--- | :------ |
        | id   | integer |
        | name | text    |
        ");
    }

    #[test]
    fn test_table_cells_are_escaped() {
        let doc = Document {
            nodes: vec![Block::Table(Table {
                headers: vec!["Default".to_string()],
                rows: vec![vec![vec![Inline::text("'a' || 'b'\nx")]]],
            })],
        };
        let output = serialize(&doc);
        assert!(output.contains("'a' \\|\\| 'b' x"));
        assert_eq!(output.lines().count(), 3);
    }

    #[test]
    fn test_table_wide_characters() {
        let doc = Document {
            nodes: vec![Block::Table(Table {
                headers: vec!["Name".to_string()],
                rows: vec![vec![vec![Inline::text("ユーザー")]]],
            })],
        };
        let output = serialize(&doc);
        // "ユーザー" is eight columns wide
        assert!(output.contains("| Name     |"));
        assert!(output.contains("| ユーザー |"));
    }

    #[test]
    fn test_inline_markup() {
        let doc = Document {
            nodes: vec![Block::Paragraph(vec![
                Inline::InternalLink {
                    text: "users.id".to_string(),
                    anchor: "users".to_string(),
                },
                Inline::text(" "),
                Inline::ExternalLink {
                    text: "text".to_string(),
                    url: "https://example.com".to_string(),
                },
                Inline::text(" "),
                Inline::Strong("Command".to_string()),
            ])],
        };
        assert_eq!(
            serialize(&doc),
            "[users.id](#users) <a href=\"https://example.com\">text</a> **Command**\n"
        );
    }

    #[test]
    fn test_anchor_with_special_characters() {
        let doc = Document {
            nodes: vec![
                heading(3, "a\"b) c", Some("a\"b)-c")),
                Block::Paragraph(vec![Inline::InternalLink {
                    text: "a\"b) c".to_string(),
                    anchor: "a\"b)-c".to_string(),
                }]),
            ],
        };
        assert_eq!(
            serialize(&doc),
            "### <a name=\"a&quot;b)-c\"></a>a\"b) c\n\n[a\"b) c](#a%22b%29-c)\n"
        );
    }

    #[test]
    fn test_fragment_encoding() {
        assert_eq!(encode_fragment("user-accounts_1"), "user-accounts_1");
        assert_eq!(encode_fragment("a<b>&c d"), "a%3Cb%3E%26c%20d");
        assert_eq!(encode_fragment("ユーザー"), "ユーザー");
    }

    #[test]
    fn test_badge() {
        let doc = Document {
            nodes: vec![Block::Paragraph(vec![
                Inline::text("id "),
                Inline::Badge("PK".to_string()),
            ])],
        };
        assert_eq!(
            serialize(&doc),
            "id <span style=\"background: #ddd; padding: 2px; font-size: 0.75rem; color: black\">PK</span>\n"
        );
    }

    #[test]
    fn test_code_block() {
        let doc = Document {
            nodes: vec![Block::CodeBlock {
                language: Some("sql".to_string()),
                code: "(id = auth.uid())\n".to_string(),
            }],
        };
        assert_eq!(serialize(&doc), "```sql\n(id = auth.uid())\n```\n");
    }

    #[test]
    fn test_code_block_fence_grows() {
        let doc = Document {
            nodes: vec![Block::CodeBlock {
                language: None,
                code: "a ```` b".to_string(),
            }],
        };
        assert_eq!(serialize(&doc), "`````\na ```` b\n`````\n");
    }

    #[test]
    fn test_nested_list() {
        let doc = Document {
            nodes: vec![
                Block::List(vec![ListItem {
                    content: vec![Inline::text("Tables")],
                    children: vec![ListItem::text("users"), ListItem::text("orders")],
                }]),
                heading(2, "Tables", None),
            ],
        };
        assert_eq!(
            serialize(&doc),
            "- Tables\n  - users\n  - orders\n\n## Tables\n"
        );
    }
}
