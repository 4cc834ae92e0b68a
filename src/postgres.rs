//! PostgreSQL catalog queries.
//!
//! Every query runs inside a `tracing` span recording the number of rows
//! returned. Filters are bound as parameters, never spliced into SQL.

use crate::ast::{
    Column, CompositeType, CustomType, ForeignKey, PrimaryKey, RlsPolicy, Table, View,
};
use crate::source::{MetadataSource, SourceError};
use tokio_postgres::types::{FromSqlOwned, ToSql};
use tokio_postgres::{Client, Row};
use tracing::Instrument;

const DEFAULT_SCHEMA: &str = "public";

/// Which relations a [`PgSource`] reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Schema namespace, `public` when unset.
    pub schema: Option<String>,
    /// Regular expressions; a relation is kept if any matches.
    pub include: Vec<String>,
    /// Regular expressions; a relation is dropped if any matches.
    /// Ignored when `include` is non-empty.
    pub exclude: Vec<String>,
}

impl Filter {
    fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    fn exclude(&self) -> &[String] {
        if self.include.is_empty() {
            &self.exclude
        } else {
            &[]
        }
    }
}

// $1 schema, $2 include patterns, $3 exclude patterns
const RELATION_FILTER: &str = "(cardinality($2::text[]) = 0 OR {name} ~ ANY($2::text[]))
        AND NOT ({name} ~ ANY($3::text[]))";

const SELECT_TABLES: &str = "
    SELECT tablename::text AS tablename
    FROM pg_catalog.pg_tables
    WHERE tablename NOT LIKE 'sql_%'
      AND tablename NOT LIKE 'pg_%'
      AND schemaname = $1
      AND {filter}
    ORDER BY tablename";

const SELECT_VIEWS: &str = "
    SELECT table_name::text AS table_name
    FROM information_schema.views
    WHERE table_schema = $1
      AND {filter}
    ORDER BY table_name";

const SELECT_COLUMNS: &str = "
    SELECT table_name::text AS table_name,
           column_name::text AS column_name,
           column_default::text AS column_default,
           is_nullable::text AS is_nullable,
           data_type::text AS data_type,
           udt_name::text AS udt_name,
           character_maximum_length::int4 AS character_maximum_length
    FROM information_schema.columns
    WHERE table_schema = $1
      AND {filter}
    ORDER BY table_name, ordinal_position";

const SELECT_FOREIGN_KEYS: &str = "
    SELECT tc.constraint_name::text AS constraint_name,
           tc.table_name::text AS source_table,
           kcu.column_name::text AS source_column,
           ccu.table_name::text AS foreign_table,
           ccu.column_name::text AS foreign_column
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage AS ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_schema = $1";

const SELECT_PRIMARY_KEYS: &str = "
    SELECT tco.constraint_name::text AS constraint_name,
           kcu.table_name::text AS table_name,
           kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tco
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_name = tco.constraint_name
     AND kcu.constraint_schema = tco.constraint_schema
    WHERE tco.constraint_type = 'PRIMARY KEY'
      AND kcu.table_schema = $1";

const SELECT_CUSTOM_TYPES: &str = "
    SELECT pg_catalog.format_type(t.oid, NULL) AS name,
           t.typname::text AS internal_name,
           ARRAY(
               SELECT e.enumlabel::text
               FROM pg_catalog.pg_enum e
               WHERE e.enumtypid = t.oid
               ORDER BY e.enumsortorder
           ) AS elements
    FROM pg_catalog.pg_type t
    LEFT JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
    WHERE (t.typrelid = 0
           OR (SELECT c.relkind = 'c' FROM pg_catalog.pg_class c WHERE c.oid = t.typrelid))
      AND NOT EXISTS (
          SELECT 1 FROM pg_catalog.pg_type el
          WHERE el.oid = t.typelem AND el.typarray = t.oid)
      AND n.nspname <> 'pg_catalog'
      AND n.nspname <> 'information_schema'
      AND pg_catalog.pg_type_is_visible(t.oid)
    ORDER BY n.nspname, 1";

const SELECT_COMPOSITE_TYPES: &str = "
    SELECT pg_catalog.format_type(t.oid, NULL) AS obj_name,
           a.attname::text AS column_name,
           pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
           a.attnum::int4 AS ordinal_position,
           a.attnotnull AS is_required
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_type t ON a.attrelid = t.typrelid
    JOIN pg_catalog.pg_class c ON c.oid = t.typrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
    WHERE c.relkind = 'c'
      AND a.attnum > 0
      AND NOT a.attisdropped
      AND n.nspname <> 'pg_catalog'
      AND n.nspname <> 'information_schema'
      AND n.nspname !~ '^pg_toast'
    ORDER BY obj_name, ordinal_position";

const SELECT_RLS_POLICIES: &str = "
    SELECT tablename::text AS table_name,
           policyname::text AS policy_name,
           format('%I ON %I.%I TO %s', policyname, schemaname, tablename, roles) AS policy_definition,
           cmd::text AS command,
           roles::text AS roles,
           qual AS using,
           with_check
    FROM pg_catalog.pg_policies
    WHERE schemaname = $1
    ORDER BY tablename, policyname";

fn with_filter(sql: &str, column: &str) -> String {
    sql.replace("{filter}", &RELATION_FILTER.replace("{name}", column))
}

/// Parameters a catalog query binds.
#[derive(Debug, Clone, Copy)]
enum Bind {
    None,
    Schema,
    SchemaAndPatterns,
}

/// Reads catalog metadata over an open connection.
pub struct PgSource<'a> {
    client: &'a Client,
    filter: Filter,
}

impl<'a> PgSource<'a> {
    pub fn new(client: &'a Client, filter: Filter) -> Self {
        Self { client, filter }
    }

    async fn query(&self, collection: &'static str, sql: &str, bind: Bind) -> Result<Vec<Row>, SourceError> {
        let span = tracing::debug_span!(
            "catalog.query",
            collection,
            rows = tracing::field::Empty,
        );
        let schema = self.filter.schema();
        let include = &self.filter.include;
        let exclude = self.filter.exclude();
        let params: Vec<&(dyn ToSql + Sync)> = match bind {
            Bind::None => vec![],
            Bind::Schema => vec![&schema],
            Bind::SchemaAndPatterns => vec![&schema, include, &exclude],
        };
        let rows = self
            .client
            .query(sql, &params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }
}

/// Read a column, turning a missing column or a type mismatch into a
/// malformed-row error.
fn get<T: FromSqlOwned>(row: &Row, column: &str) -> Result<T, SourceError> {
    row.try_get(column).map_err(|e| SourceError::Malformed {
        reason: format!("column \"{}\": {}", column, e),
    })
}

/// User-defined types report their own name, bounded `character`
/// columns carry their length.
pub fn column_data_type(data_type: &str, udt_name: &str, max_length: Option<i32>) -> String {
    match (data_type, max_length) {
        ("USER-DEFINED", _) => udt_name.to_string(),
        ("character", Some(n)) if n > 0 => format!("character ({})", n),
        _ => data_type.to_string(),
    }
}

/// `{anon,authenticated}` → `["anon", "authenticated"]`.
pub fn parse_roles(roles: &str) -> Vec<String> {
    let inner = roles
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(roles);
    inner
        .split(',')
        .map(|r| r.trim().trim_matches('"').to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

fn decode_table(row: &Row) -> Result<Table, SourceError> {
    Ok(Table {
        name: get(row, "tablename")?,
    })
}

fn decode_view(row: &Row) -> Result<View, SourceError> {
    Ok(View {
        name: get(row, "table_name")?,
    })
}

fn decode_column(row: &Row) -> Result<Column, SourceError> {
    let data_type: String = get(row, "data_type")?;
    let udt_name: String = get(row, "udt_name")?;
    let max_length: Option<i32> = get(row, "character_maximum_length")?;
    let is_nullable: String = get(row, "is_nullable")?;
    Ok(Column {
        table: get(row, "table_name")?,
        name: get(row, "column_name")?,
        data_type: column_data_type(&data_type, &udt_name, max_length),
        default: get(row, "column_default")?,
        is_nullable: is_nullable == "YES",
    })
}

fn decode_foreign_key(row: &Row) -> Result<ForeignKey, SourceError> {
    Ok(ForeignKey {
        constraint_name: get(row, "constraint_name")?,
        source_table: get(row, "source_table")?,
        source_column: get(row, "source_column")?,
        foreign_table: get(row, "foreign_table")?,
        foreign_column: get(row, "foreign_column")?,
    })
}

fn decode_primary_key(row: &Row) -> Result<PrimaryKey, SourceError> {
    Ok(PrimaryKey {
        constraint_name: get(row, "constraint_name")?,
        table: get(row, "table_name")?,
        column: get(row, "column_name")?,
    })
}

fn decode_custom_type(row: &Row) -> Result<CustomType, SourceError> {
    Ok(CustomType {
        name: get(row, "name")?,
        internal_name: get(row, "internal_name")?,
        elements: get(row, "elements")?,
    })
}

fn decode_composite_type(row: &Row) -> Result<CompositeType, SourceError> {
    Ok(CompositeType {
        name: get(row, "obj_name")?,
        column_name: get(row, "column_name")?,
        data_type: get(row, "data_type")?,
        position: get(row, "ordinal_position")?,
        is_required: get(row, "is_required")?,
    })
}

fn decode_policy(row: &Row) -> Result<RlsPolicy, SourceError> {
    let roles: String = get(row, "roles")?;
    Ok(RlsPolicy {
        table: get(row, "table_name")?,
        name: get(row, "policy_name")?,
        definition: get(row, "policy_definition")?,
        command: get(row, "command")?,
        roles: parse_roles(&roles),
        using: get(row, "using")?,
        with_check: get(row, "with_check")?,
    })
}

impl MetadataSource for PgSource<'_> {
    async fn select_tables(&self) -> Result<Vec<Table>, SourceError> {
        let sql = with_filter(SELECT_TABLES, "tablename");
        let rows = self.query("tables", &sql, Bind::SchemaAndPatterns).await?;
        rows.iter().map(decode_table).collect()
    }

    async fn select_views(&self) -> Result<Vec<View>, SourceError> {
        let sql = with_filter(SELECT_VIEWS, "table_name");
        let rows = self.query("views", &sql, Bind::SchemaAndPatterns).await?;
        rows.iter().map(decode_view).collect()
    }

    async fn select_columns(&self) -> Result<Vec<Column>, SourceError> {
        let sql = with_filter(SELECT_COLUMNS, "table_name");
        let rows = self.query("columns", &sql, Bind::SchemaAndPatterns).await?;
        rows.iter().map(decode_column).collect()
    }

    async fn select_foreign_keys(&self) -> Result<Vec<ForeignKey>, SourceError> {
        let rows = self
            .query("foreign_keys", SELECT_FOREIGN_KEYS, Bind::Schema)
            .await?;
        rows.iter().map(decode_foreign_key).collect()
    }

    async fn select_primary_keys(&self) -> Result<Vec<PrimaryKey>, SourceError> {
        let rows = self
            .query("primary_keys", SELECT_PRIMARY_KEYS, Bind::Schema)
            .await?;
        rows.iter().map(decode_primary_key).collect()
    }

    async fn select_custom_types(&self) -> Result<Vec<CustomType>, SourceError> {
        let rows = self
            .query("custom_types", SELECT_CUSTOM_TYPES, Bind::None)
            .await?;
        rows.iter().map(decode_custom_type).collect()
    }

    async fn select_composite_types(&self) -> Result<Vec<CompositeType>, SourceError> {
        let rows = self
            .query("composite_types", SELECT_COMPOSITE_TYPES, Bind::None)
            .await?;
        rows.iter().map(decode_composite_type).collect()
    }

    async fn select_rls_policies(&self) -> Result<Vec<RlsPolicy>, SourceError> {
        let rows = self
            .query("rls_policies", SELECT_RLS_POLICIES, Bind::Schema)
            .await?;
        rows.iter().map(decode_policy).collect()
    }
}
