//! Schema assembly: joins the raw catalog collections into one [`Schema`].

use crate::ast::{
    Column, CompositeType, CustomType, ForeignKey, PrimaryKey, Table, View,
};
use crate::ir::{
    ColumnDescription, ColumnRef, CompositeField, CompositeTypeDescription, Schema,
    TableDescription,
};
use crate::source::{Collection, MetadataSnapshot, MetadataSource, SourceError};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Failed to fetch {collection}: {source}")]
    Fetch {
        collection: Collection,
        #[source]
        source: SourceError,
    },
}

trait FetchContext<T> {
    fn collection(self, collection: Collection) -> Result<T, AssembleError>;
}

impl<T> FetchContext<T> for Result<T, SourceError> {
    fn collection(self, collection: Collection) -> Result<T, AssembleError> {
        self.map_err(|source| AssembleError::Fetch { collection, source })
    }
}

/// Fetch every collection from `source` and assemble the schema.
///
/// Any source failure aborts the whole assembly.
pub async fn assemble<S: MetadataSource>(source: &S) -> Result<Schema, AssembleError> {
    let snapshot = MetadataSnapshot {
        tables: source.select_tables().await.collection(Collection::Tables)?,
        views: source.select_views().await.collection(Collection::Views)?,
        columns: source.select_columns().await.collection(Collection::Columns)?,
        foreign_keys: source
            .select_foreign_keys()
            .await
            .collection(Collection::ForeignKeys)?,
        primary_keys: source
            .select_primary_keys()
            .await
            .collection(Collection::PrimaryKeys)?,
        custom_types: source
            .select_custom_types()
            .await
            .collection(Collection::CustomTypes)?,
        composite_types: source
            .select_composite_types()
            .await
            .collection(Collection::CompositeTypes)?,
        rls_policies: source
            .select_rls_policies()
            .await
            .collection(Collection::RlsPolicies)?,
    };

    Ok(assemble_snapshot(&snapshot))
}

/// Assemble a schema from collections already in memory.
pub fn assemble_snapshot(snapshot: &MetadataSnapshot) -> Schema {
    let tables: Vec<TableDescription> = snapshot
        .tables
        .iter()
        .map(|Table { name }| describe(name, snapshot))
        .collect();

    let views: Vec<TableDescription> = snapshot
        .views
        .iter()
        .map(|View { name }| describe(name, snapshot))
        .collect();

    let custom_types: Vec<CustomType> = snapshot
        .custom_types
        .iter()
        .filter(|t| has_elements(t))
        .cloned()
        .collect();

    let composite_types = compact_composites(&snapshot.composite_types);

    tracing::debug!(
        tables = tables.len(),
        views = views.len(),
        custom_types = custom_types.len(),
        composite_types = composite_types.len(),
        rls_policies = snapshot.rls_policies.len(),
        "assembled schema"
    );

    Schema {
        tables,
        views,
        custom_types,
        composite_types,
        rls_policies: snapshot.rls_policies.clone(),
    }
}

fn describe(name: &str, snapshot: &MetadataSnapshot) -> TableDescription {
    let columns = snapshot
        .columns
        .iter()
        .filter(|c| c.table == name)
        .map(|c| ColumnDescription {
            name: c.name.clone(),
            data_type: c.data_type.clone(),
            default: c.default.clone(),
            is_nullable: c.is_nullable,
            is_primary_key: is_primary_key(name, c, &snapshot.primary_keys),
            foreign_key: foreign_key(name, c, &snapshot.foreign_keys),
        })
        .collect();

    TableDescription {
        name: name.to_string(),
        columns,
    }
}

fn is_primary_key(table: &str, column: &Column, primary_keys: &[PrimaryKey]) -> bool {
    primary_keys
        .iter()
        .any(|pk| pk.table == table && pk.column == column.name)
}

/// First matching foreign key wins.
fn foreign_key(table: &str, column: &Column, foreign_keys: &[ForeignKey]) -> Option<ColumnRef> {
    foreign_keys
        .iter()
        .find(|fk| fk.source_table == table && fk.source_column == column.name)
        .map(|fk| ColumnRef::new(&fk.foreign_table, &fk.foreign_column))
}

fn has_elements(custom: &CustomType) -> bool {
    custom.elements.iter().any(|e| !e.trim().is_empty())
}

fn compact_composites(rows: &[CompositeType]) -> Vec<CompositeTypeDescription> {
    let mut compacted: Vec<CompositeTypeDescription> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let field = CompositeField {
            name: row.column_name.clone(),
            data_type: row.data_type.clone(),
            is_required: row.is_required,
            position: row.position,
        };
        match index.get(row.name.as_str()) {
            Some(&i) => compacted[i].fields.push(field),
            None => {
                index.insert(row.name.as_str(), compacted.len());
                compacted.push(CompositeTypeDescription {
                    name: row.name.clone(),
                    fields: vec![field],
                });
            }
        }
    }

    compacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RlsPolicy;

    fn column(table: &str, name: &str, data_type: &str) -> Column {
        Column {
            table: table.to_string(),
            name: name.to_string(),
            data_type: data_type.to_string(),
            default: None,
            is_nullable: true,
        }
    }

    fn fk(source: (&str, &str), target: (&str, &str)) -> ForeignKey {
        ForeignKey {
            constraint_name: format!("{}_{}_fkey", source.0, source.1),
            source_table: source.0.to_string(),
            source_column: source.1.to_string(),
            foreign_table: target.0.to_string(),
            foreign_column: target.1.to_string(),
        }
    }

    fn pk(table: &str, column: &str) -> PrimaryKey {
        PrimaryKey {
            constraint_name: format!("{}_pkey", table),
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    fn composite(name: &str, column: &str, position: i32) -> CompositeType {
        CompositeType {
            name: name.to_string(),
            column_name: column.to_string(),
            data_type: "text".to_string(),
            position,
            is_required: false,
        }
    }

    fn custom(name: &str, elements: &[&str]) -> CustomType {
        CustomType {
            name: name.to_string(),
            internal_name: name.to_string(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn users_and_orders() -> MetadataSnapshot {
        MetadataSnapshot {
            tables: vec![
                Table { name: "users".to_string() },
                Table { name: "orders".to_string() },
            ],
            columns: vec![
                column("users", "id", "integer"),
                column("orders", "id", "integer"),
                column("users", "email", "text"),
                column("orders", "user_id", "integer"),
            ],
            primary_keys: vec![pk("users", "id"), pk("orders", "id")],
            foreign_keys: vec![fk(("orders", "user_id"), ("users", "id"))],
            ..Default::default()
        }
    }

    #[test]
    fn test_columns_follow_their_table() {
        let schema = assemble_snapshot(&users_and_orders());

        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.tables[0].name, "users");
        let names: Vec<&str> = schema.tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email"]);
        let names: Vec<&str> = schema.tables[1].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "user_id"]);
    }

    #[test]
    fn test_primary_key_decoration() {
        let schema = assemble_snapshot(&users_and_orders());
        let users = &schema.tables[0];

        assert!(users.columns[0].is_primary_key);
        assert!(!users.columns[1].is_primary_key);
    }

    #[test]
    fn test_primary_key_requires_same_table() {
        let mut snapshot = users_and_orders();
        snapshot.primary_keys = vec![pk("users", "user_id")];
        let schema = assemble_snapshot(&snapshot);

        assert!(schema.tables[1].columns.iter().all(|c| !c.is_primary_key));
    }

    #[test]
    fn test_foreign_key_decoration() {
        let schema = assemble_snapshot(&users_and_orders());
        let orders = &schema.tables[1];

        assert_eq!(orders.columns[0].foreign_key, None);
        assert_eq!(
            orders.columns[1].foreign_key,
            Some(ColumnRef::new("users", "id"))
        );
    }

    #[test]
    fn test_first_foreign_key_wins() {
        let mut snapshot = users_and_orders();
        snapshot
            .foreign_keys
            .push(fk(("orders", "user_id"), ("accounts", "id")));
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(
            schema.tables[1].columns[1].foreign_key,
            Some(ColumnRef::new("users", "id"))
        );
    }

    #[test]
    fn test_dangling_foreign_key_is_kept() {
        let mut snapshot = users_and_orders();
        snapshot.foreign_keys = vec![fk(("orders", "user_id"), ("archived_users", "id"))];
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(
            schema.tables[1].columns[1].foreign_key,
            Some(ColumnRef::new("archived_users", "id"))
        );
    }

    #[test]
    fn test_table_without_columns() {
        let snapshot = MetadataSnapshot {
            tables: vec![Table { name: "empty".to_string() }],
            ..Default::default()
        };
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(schema.tables.len(), 1);
        assert!(schema.tables[0].columns.is_empty());
    }

    #[test]
    fn test_views_are_decorated_too() {
        let mut snapshot = users_and_orders();
        snapshot.views = vec![View { name: "active_users".to_string() }];
        snapshot.columns.push(column("active_users", "id", "integer"));
        snapshot.primary_keys.push(pk("active_users", "id"));
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(schema.views.len(), 1);
        assert_eq!(schema.views[0].columns.len(), 1);
        assert!(schema.views[0].columns[0].is_primary_key);
    }

    #[test]
    fn test_custom_type_filtering() {
        let snapshot = MetadataSnapshot {
            custom_types: vec![
                custom("blank", &[""]),
                custom("spaces", &["  ", " "]),
                custom("mood", &["a", ""]),
            ],
            ..Default::default()
        };
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(schema.custom_types.len(), 1);
        assert_eq!(schema.custom_types[0].name, "mood");
        assert_eq!(schema.custom_types[0].elements, vec!["a", ""]);
    }

    #[test]
    fn test_composite_compaction() {
        let snapshot = MetadataSnapshot {
            composite_types: vec![
                composite("addr", "city", 1),
                composite("point", "x", 1),
                composite("addr", "zip", 2),
                composite("point", "y", 2),
            ],
            ..Default::default()
        };
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(schema.composite_types.len(), 2);
        let addr = &schema.composite_types[0];
        assert_eq!(addr.name, "addr");
        let fields: Vec<&str> = addr.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["city", "zip"]);
        assert_eq!(schema.composite_types[1].name, "point");
        assert_eq!(schema.composite_types[1].fields.len(), 2);
    }

    #[test]
    fn test_policies_pass_through() {
        let policy = RlsPolicy {
            table: "users".to_string(),
            name: "own_rows".to_string(),
            definition: "own_rows ON public.users TO authenticated".to_string(),
            command: "SELECT".to_string(),
            roles: vec!["authenticated".to_string()],
            using: Some("(id = current_user_id())".to_string()),
            with_check: None,
        };
        let mut snapshot = users_and_orders();
        snapshot.rls_policies = vec![policy.clone()];
        let schema = assemble_snapshot(&snapshot);

        assert_eq!(schema.rls_policies, vec![policy]);
    }

    struct FailingSource;

    impl MetadataSource for FailingSource {
        async fn select_tables(&self) -> Result<Vec<Table>, SourceError> {
            Ok(vec![])
        }
        async fn select_views(&self) -> Result<Vec<View>, SourceError> {
            Ok(vec![])
        }
        async fn select_columns(&self) -> Result<Vec<Column>, SourceError> {
            Err(SourceError::Malformed {
                reason: "column \"is_nullable\" is missing".to_string(),
            })
        }
        async fn select_foreign_keys(&self) -> Result<Vec<ForeignKey>, SourceError> {
            Ok(vec![])
        }
        async fn select_primary_keys(&self) -> Result<Vec<PrimaryKey>, SourceError> {
            Ok(vec![])
        }
        async fn select_custom_types(&self) -> Result<Vec<CustomType>, SourceError> {
            Ok(vec![])
        }
        async fn select_composite_types(&self) -> Result<Vec<CompositeType>, SourceError> {
            Ok(vec![])
        }
        async fn select_rls_policies(&self) -> Result<Vec<RlsPolicy>, SourceError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_assemble_from_source() {
        let schema = assemble(&users_and_orders()).await.unwrap();
        assert_eq!(schema, assemble_snapshot(&users_and_orders()));
    }

    #[tokio::test]
    async fn test_malformed_rows_name_the_collection() {
        let err = assemble(&FailingSource).await.unwrap_err();

        let AssembleError::Fetch { collection, .. } = &err;
        assert_eq!(*collection, Collection::Columns);
        assert!(err.to_string().starts_with("Failed to fetch columns"));
    }
}
