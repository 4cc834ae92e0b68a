//! Document renderer: projects a [`Schema`] into a [`Document`].

use crate::ast::{CustomType, RlsPolicy};
use crate::document::{Block, Document, Heading, Inline, ListItem, Table};
use crate::ir::{ColumnDescription, ColumnRef, CompositeTypeDescription, Schema, TableDescription};
use crate::typedocs::TypeDocs;
use std::collections::{HashMap, HashSet};

const TABLES: &str = "Tables";
const VIEWS: &str = "Views";
const TYPES: &str = "Types";
const CONTENTS: &str = "Table of Contents";
const POLICIES: &str = "Row-Level Security Policies";

const COLUMN_HEADERS: [&str; 5] = ["Name", "Type", "Default", "Nullable", "References"];
const FIELD_HEADERS: [&str; 4] = ["column name", "type", "position", "required?"];

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Emit the Types section (custom and composite types).
    pub include_types: bool,
    /// No HTML anchors, style spans or links; names render as plain text.
    pub pure_markdown: bool,
    /// Emit each table's row-level security policies.
    pub include_rls: bool,
    /// Prepend a table of contents.
    pub include_toc: bool,
    pub type_docs: TypeDocs,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_types: true,
            pure_markdown: false,
            include_rls: true,
            include_toc: false,
            type_docs: TypeDocs::postgres(),
        }
    }
}

/// Anchor slug for a heading: lowercase, whitespace runs become `-`.
pub fn slugify(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Hands out unique anchors in document order.
#[derive(Debug, Default)]
struct Anchors {
    used: HashSet<String>,
}

impl Anchors {
    fn assign(&mut self, text: &str) -> String {
        let slug = slugify(text);
        let mut candidate = slug.clone();
        let mut n = 0;
        while !self.used.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{}-{}", slug, n);
        }
        candidate
    }
}

/// Render `schema` as a document. Same inputs, same document.
pub fn render(schema: &Schema, options: &RenderOptions) -> Document {
    Renderer::new(schema, options).render()
}

struct Renderer<'a> {
    schema: &'a Schema,
    options: &'a RenderOptions,
    sections: HashMap<&'static str, String>,
    tables: Vec<String>,
    views: Vec<String>,
    custom_types: Vec<String>,
    composite_types: Vec<String>,
    /// Link targets for foreign keys, by table name. Tables win over views.
    relation_anchors: HashMap<&'a str, String>,
    /// Link targets for type names, only when the Types section is emitted.
    type_anchors: HashMap<&'a str, String>,
}

impl<'a> Renderer<'a> {
    fn new(schema: &'a Schema, options: &'a RenderOptions) -> Self {
        let mut anchors = Anchors::default();
        let mut sections = HashMap::new();
        let mut relation_anchors = HashMap::new();
        let mut type_anchors = HashMap::new();

        if !schema.tables.is_empty() {
            sections.insert(TABLES, anchors.assign(TABLES));
        }
        let tables: Vec<String> = schema
            .tables
            .iter()
            .map(|t| anchors.assign(&t.name))
            .collect();

        if !schema.views.is_empty() {
            sections.insert(VIEWS, anchors.assign(VIEWS));
        }
        let views: Vec<String> = schema
            .views
            .iter()
            .map(|v| anchors.assign(&v.name))
            .collect();

        for (table, anchor) in schema.tables.iter().zip(&tables) {
            relation_anchors
                .entry(table.name.as_str())
                .or_insert_with(|| anchor.clone());
        }
        for (view, anchor) in schema.views.iter().zip(&views) {
            relation_anchors
                .entry(view.name.as_str())
                .or_insert_with(|| anchor.clone());
        }

        let mut custom_types = Vec::new();
        let mut composite_types = Vec::new();
        if Self::has_types_section(schema, options) {
            sections.insert(TYPES, anchors.assign(TYPES));
            custom_types = schema
                .custom_types
                .iter()
                .map(|t| anchors.assign(&t.name))
                .collect();
            composite_types = schema
                .composite_types
                .iter()
                .map(|t| anchors.assign(&t.name))
                .collect();

            for (custom, anchor) in schema.custom_types.iter().zip(&custom_types) {
                type_anchors
                    .entry(custom.name.as_str())
                    .or_insert_with(|| anchor.clone());
            }
            for (composite, anchor) in schema.composite_types.iter().zip(&composite_types) {
                type_anchors
                    .entry(composite.name.as_str())
                    .or_insert_with(|| anchor.clone());
            }
            // Columns report user-defined types by their internal name.
            for (custom, anchor) in schema.custom_types.iter().zip(&custom_types) {
                type_anchors
                    .entry(custom.internal_name.as_str())
                    .or_insert_with(|| anchor.clone());
            }
        }

        Self {
            schema,
            options,
            sections,
            tables,
            views,
            custom_types,
            composite_types,
            relation_anchors,
            type_anchors,
        }
    }

    fn has_types_section(schema: &Schema, options: &RenderOptions) -> bool {
        options.include_types
            && !(schema.custom_types.is_empty() && schema.composite_types.is_empty())
    }

    fn render(&self) -> Document {
        let mut body = Document::default();

        if !self.schema.tables.is_empty() {
            self.section_heading(&mut body, TABLES);
            for (table, anchor) in self.schema.tables.iter().zip(&self.tables) {
                self.render_relation(&mut body, table, anchor);
                if self.options.include_rls {
                    self.render_policies(&mut body, &table.name);
                }
            }
        }

        if !self.schema.views.is_empty() {
            self.section_heading(&mut body, VIEWS);
            for (view, anchor) in self.schema.views.iter().zip(&self.views) {
                self.render_relation(&mut body, view, anchor);
            }
        }

        if Self::has_types_section(self.schema, self.options) {
            self.section_heading(&mut body, TYPES);
            for (custom, anchor) in self.schema.custom_types.iter().zip(&self.custom_types) {
                self.render_custom_type(&mut body, custom, anchor);
            }
            for (composite, anchor) in self
                .schema
                .composite_types
                .iter()
                .zip(&self.composite_types)
            {
                self.render_composite_type(&mut body, composite, anchor);
            }
        }

        if !self.options.include_toc {
            return body;
        }

        let mut doc = Document::default();
        doc.push(Block::Heading(Heading {
            level: 2,
            text: CONTENTS.to_string(),
            anchor: None,
        }));
        doc.push(Block::List(table_of_contents(&body)));
        doc.nodes.extend(body.nodes);
        doc
    }

    fn heading(&self, level: u8, text: &str, anchor: &str) -> Block {
        Block::Heading(Heading {
            level,
            text: text.to_string(),
            anchor: (!self.options.pure_markdown).then(|| anchor.to_string()),
        })
    }

    fn section_heading(&self, doc: &mut Document, title: &'static str) {
        let anchor = self.sections.get(title).cloned().unwrap_or_else(|| slugify(title));
        doc.push(self.heading(2, title, &anchor));
    }

    fn render_relation(&self, doc: &mut Document, relation: &TableDescription, anchor: &str) {
        doc.push(self.heading(3, &relation.name, anchor));
        let rows = relation
            .columns
            .iter()
            .map(|column| self.column_row(column))
            .collect();
        doc.push(Block::Table(Table {
            headers: COLUMN_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows,
        }));
    }

    fn column_row(&self, column: &ColumnDescription) -> Vec<Vec<Inline>> {
        vec![
            self.column_name(column),
            vec![self.type_link(&column.data_type)],
            vec![Inline::text(column.default.clone().unwrap_or_default())],
            vec![Inline::text(if column.is_nullable { "True" } else { "False" })],
            column
                .foreign_key
                .as_ref()
                .map(|target| vec![self.reference_link(target)])
                .unwrap_or_else(|| vec![Inline::text("")]),
        ]
    }

    fn column_name(&self, column: &ColumnDescription) -> Vec<Inline> {
        match (column.is_primary_key, self.options.pure_markdown) {
            (false, _) => vec![Inline::text(column.name.clone())],
            (true, true) => vec![Inline::text(format!("{} (PK)", column.name))],
            (true, false) => vec![
                Inline::text(format!("{} ", column.name)),
                Inline::Badge("PK".to_string()),
            ],
        }
    }

    /// Never fails: unknown types come back as plain text.
    fn type_link(&self, data_type: &str) -> Inline {
        if self.options.pure_markdown {
            return Inline::text(data_type);
        }
        if let Some(anchor) = self.type_anchors.get(data_type) {
            return Inline::InternalLink {
                text: data_type.to_string(),
                anchor: anchor.clone(),
            };
        }
        match self.options.type_docs.url_for(data_type) {
            Some(url) => Inline::ExternalLink {
                text: data_type.to_string(),
                url: url.to_string(),
            },
            None => Inline::text(data_type),
        }
    }

    /// Targets outside the rendered set still link by slug.
    fn reference_link(&self, target: &ColumnRef) -> Inline {
        if self.options.pure_markdown {
            return Inline::text(target.to_string());
        }
        let anchor = self
            .relation_anchors
            .get(target.table.as_str())
            .cloned()
            .unwrap_or_else(|| slugify(&target.table));
        Inline::InternalLink {
            text: target.to_string(),
            anchor,
        }
    }

    fn render_policies(&self, doc: &mut Document, table: &str) {
        let mut policies = self.schema.policies_for(table).peekable();
        if policies.peek().is_none() {
            return;
        }

        doc.push(Block::Heading(Heading {
            level: 4,
            text: POLICIES.to_string(),
            anchor: None,
        }));
        for policy in policies {
            render_policy(doc, policy);
        }
    }

    fn render_custom_type(&self, doc: &mut Document, custom: &CustomType, anchor: &str) {
        doc.push(self.heading(3, &custom.name, anchor));
        let items = custom
            .elements
            .iter()
            .map(|e| e.trim())
            // Blank labels would render as empty bullets.
            .filter(|e| !e.is_empty())
            .map(ListItem::text)
            .collect();
        doc.push(Block::List(items));
    }

    fn render_composite_type(
        &self,
        doc: &mut Document,
        composite: &CompositeTypeDescription,
        anchor: &str,
    ) {
        doc.push(self.heading(3, &composite.name, anchor));

        let mut fields: Vec<_> = composite.fields.iter().collect();
        fields.sort_by_key(|f| f.position);

        let rows = fields
            .into_iter()
            .map(|field| {
                vec![
                    vec![Inline::text(field.name.clone())],
                    vec![self.type_link(&field.data_type)],
                    vec![Inline::text(field.position.to_string())],
                    vec![Inline::text(field.is_required.to_string())],
                ]
            })
            .collect();
        doc.push(Block::Table(Table {
            headers: FIELD_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows,
        }));
    }
}

fn render_policy(doc: &mut Document, policy: &RlsPolicy) {
    doc.push(Block::Heading(Heading {
        level: 5,
        text: policy.name.clone(),
        anchor: None,
    }));

    let roles: Vec<&str> = policy
        .roles
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    doc.push(Block::List(vec![
        labeled("Command:", &policy.command),
        labeled("Roles:", &roles.join(", ")),
    ]));

    code_section(doc, "Definition:", Some(policy.definition.as_str()));
    code_section(doc, "USING:", policy.using.as_deref());
    code_section(doc, "WITH CHECK:", policy.with_check.as_deref());
}

fn labeled(label: &str, value: &str) -> ListItem {
    ListItem {
        content: vec![Inline::Strong(label.to_string()), Inline::text(format!(" {}", value))],
        children: vec![],
    }
}

fn code_section(doc: &mut Document, label: &str, code: Option<&str>) {
    let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
        return;
    };
    doc.push(Block::Paragraph(vec![Inline::Strong(label.to_string())]));
    doc.push(Block::CodeBlock {
        language: Some("sql".to_string()),
        code: code.to_string(),
    });
}

/// One entry per section heading, with entity headings nested below.
fn table_of_contents(body: &Document) -> Vec<ListItem> {
    let mut items: Vec<ListItem> = Vec::new();
    for heading in body.headings() {
        let entry = ListItem {
            content: vec![match &heading.anchor {
                Some(anchor) => Inline::InternalLink {
                    text: heading.text.clone(),
                    anchor: anchor.clone(),
                },
                None => Inline::text(heading.text.clone()),
            }],
            children: vec![],
        };
        match heading.level {
            2 => items.push(entry),
            3 => match items.last_mut() {
                Some(section) => section.children.push(entry),
                None => items.push(entry),
            },
            _ => {}
        }
    }
    items
}
