//! Raw catalog rows, as delivered by a metadata source.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub table: String,
    pub name: String,
    /// Normalized type name: `udt_name` for user-defined types,
    /// `character (<n>)` for bounded character types.
    pub data_type: String,
    #[serde(default)]
    pub default: Option<String>,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    pub constraint_name: String,
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub constraint_name: String,
    pub source_table: String,
    pub source_column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

/// Enum-like user type. Composite types also show up here with no
/// elements and get dropped during assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomType {
    pub name: String,
    pub internal_name: String,
    pub elements: Vec<String>,
}

/// One field of a composite type. Several rows share a `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeType {
    pub name: String,
    pub column_name: String,
    pub data_type: String,
    pub position: i32,
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlsPolicy {
    pub table: String,
    pub name: String,
    pub definition: String,
    pub command: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub using: Option<String>,
    #[serde(default)]
    pub with_check: Option<String>,
}
