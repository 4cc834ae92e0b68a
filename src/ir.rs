//! The assembled schema handed to the renderer.

use crate::ast::{CustomType, RlsPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `table.column` reference, the target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: String,
    pub default: Option<String>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub foreign_key: Option<ColumnRef>,
}

/// A table or a view with its decorated columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeField {
    pub name: String,
    pub data_type: String,
    pub is_required: bool,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeTypeDescription {
    pub name: String,
    pub fields: Vec<CompositeField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub tables: Vec<TableDescription>,
    pub views: Vec<TableDescription>,
    pub custom_types: Vec<CustomType>,
    pub composite_types: Vec<CompositeTypeDescription>,
    pub rls_policies: Vec<RlsPolicy>,
}

impl Schema {
    /// Policies attached to the named table, in source order.
    pub fn policies_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RlsPolicy> + 'a {
        self.rls_policies.iter().filter(move |p| p.table == table)
    }
}
