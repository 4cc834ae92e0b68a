//! Metadata sources: where the raw catalog rows come from.

use crate::ast::{
    Column, CompositeType, CustomType, ForeignKey, PrimaryKey, RlsPolicy, Table, View,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// The raw collections a source delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Tables,
    Views,
    Columns,
    ForeignKeys,
    PrimaryKeys,
    CustomTypes,
    CompositeTypes,
    RlsPolicies,
}

impl Collection {
    /// Key of the collection in a JSON snapshot.
    pub fn key(self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Columns => "columns",
            Self::ForeignKeys => "foreignKeys",
            Self::PrimaryKeys => "primaryKeys",
            Self::CustomTypes => "customTypes",
            Self::CompositeTypes => "compositeTypes",
            Self::RlsPolicies => "rlsPolicies",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Columns => "columns",
            Self::ForeignKeys => "foreign keys",
            Self::PrimaryKeys => "primary keys",
            Self::CustomTypes => "custom types",
            Self::CompositeTypes => "composite types",
            Self::RlsPolicies => "RLS policies",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[cfg(feature = "postgres")]
    #[error("Query failed: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("Malformed row: {reason}")]
    Malformed { reason: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("Malformed {collection}: {source}")]
    Collection {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only access to catalog metadata.
///
/// Implementations apply their own schema and table-name filters; callers
/// only ever see the already-filtered rows.
pub trait MetadataSource {
    fn select_tables(&self) -> impl Future<Output = Result<Vec<Table>, SourceError>>;
    fn select_views(&self) -> impl Future<Output = Result<Vec<View>, SourceError>>;
    fn select_columns(&self) -> impl Future<Output = Result<Vec<Column>, SourceError>>;
    fn select_foreign_keys(&self) -> impl Future<Output = Result<Vec<ForeignKey>, SourceError>>;
    fn select_primary_keys(&self) -> impl Future<Output = Result<Vec<PrimaryKey>, SourceError>>;
    fn select_custom_types(&self) -> impl Future<Output = Result<Vec<CustomType>, SourceError>>;
    fn select_composite_types(
        &self,
    ) -> impl Future<Output = Result<Vec<CompositeType>, SourceError>>;
    fn select_rls_policies(&self) -> impl Future<Output = Result<Vec<RlsPolicy>, SourceError>>;
}

/// All raw collections held in memory.
///
/// Loads from a JSON snapshot with camelCase keys. Missing collections
/// are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
    pub primary_keys: Vec<PrimaryKey>,
    pub custom_types: Vec<CustomType>,
    pub composite_types: Vec<CompositeType>,
    pub rls_policies: Vec<RlsPolicy>,
}

impl MetadataSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let mut raw: Map<String, Value> =
            serde_json::from_str(json).map_err(SnapshotError::Syntax)?;
        Ok(Self {
            tables: decode(&mut raw, Collection::Tables)?,
            views: decode(&mut raw, Collection::Views)?,
            columns: decode(&mut raw, Collection::Columns)?,
            foreign_keys: decode(&mut raw, Collection::ForeignKeys)?,
            primary_keys: decode(&mut raw, Collection::PrimaryKeys)?,
            custom_types: decode(&mut raw, Collection::CustomTypes)?,
            composite_types: decode(&mut raw, Collection::CompositeTypes)?,
            rls_policies: decode(&mut raw, Collection::RlsPolicies)?,
        })
    }
}

fn decode<T: DeserializeOwned>(
    raw: &mut Map<String, Value>,
    collection: Collection,
) -> Result<Vec<T>, SnapshotError> {
    match raw.remove(collection.key()) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|source| SnapshotError::Collection { collection, source }),
    }
}

impl MetadataSource for MetadataSnapshot {
    async fn select_tables(&self) -> Result<Vec<Table>, SourceError> {
        Ok(self.tables.clone())
    }

    async fn select_views(&self) -> Result<Vec<View>, SourceError> {
        Ok(self.views.clone())
    }

    async fn select_columns(&self) -> Result<Vec<Column>, SourceError> {
        Ok(self.columns.clone())
    }

    async fn select_foreign_keys(&self) -> Result<Vec<ForeignKey>, SourceError> {
        Ok(self.foreign_keys.clone())
    }

    async fn select_primary_keys(&self) -> Result<Vec<PrimaryKey>, SourceError> {
        Ok(self.primary_keys.clone())
    }

    async fn select_custom_types(&self) -> Result<Vec<CustomType>, SourceError> {
        Ok(self.custom_types.clone())
    }

    async fn select_composite_types(&self) -> Result<Vec<CompositeType>, SourceError> {
        Ok(self.composite_types.clone())
    }

    async fn select_rls_policies(&self) -> Result<Vec<RlsPolicy>, SourceError> {
        Ok(self.rls_policies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "tables": [{ "name": "users" }],
            "columns": [
                { "table": "users", "name": "id", "dataType": "integer", "isNullable": false },
                { "table": "users", "name": "bio", "dataType": "text", "default": "''::text", "isNullable": true }
            ],
            "primaryKeys": [{ "constraintName": "users_pkey", "table": "users", "column": "id" }]
        }"#;
        let snapshot = MetadataSnapshot::from_json(json).unwrap();

        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.columns.len(), 2);
        assert_eq!(snapshot.columns[0].default, None);
        assert_eq!(snapshot.columns[1].default.as_deref(), Some("''::text"));
        assert_eq!(snapshot.primary_keys[0].constraint_name, "users_pkey");
        assert!(snapshot.views.is_empty());
        assert!(snapshot.rls_policies.is_empty());
    }

    #[test]
    fn test_snapshot_rejects_malformed_column() {
        let json = r#"{ "columns": [{ "table": "users", "name": "id", "dataType": "integer" }] }"#;
        let err = MetadataSnapshot::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Collection {
                collection: Collection::Columns,
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains("columns"));
        assert!(message.contains("isNullable"));
    }

    #[test]
    fn test_snapshot_names_collection_with_spaces() {
        let json = r#"{ "tables": [], "foreignKeys": [{ "constraintName": "fk" }] }"#;
        let err = MetadataSnapshot::from_json(json).unwrap_err();
        assert!(err.to_string().starts_with("Malformed foreign keys:"));
    }

    #[test]
    fn test_snapshot_null_collection_is_empty() {
        let snapshot = MetadataSnapshot::from_json(r#"{ "views": null }"#).unwrap();
        assert!(snapshot.views.is_empty());
    }

    #[test]
    fn test_snapshot_not_an_object() {
        let err = MetadataSnapshot::from_json("[]").unwrap_err();
        assert!(matches!(err, SnapshotError::Syntax(_)));
    }

    #[test]
    fn test_collection_keys() {
        assert_eq!(Collection::RlsPolicies.key(), "rlsPolicies");
        assert_eq!(Collection::RlsPolicies.to_string(), "RLS policies");
        assert_eq!(Collection::CompositeTypes.key(), "compositeTypes");
    }
}
