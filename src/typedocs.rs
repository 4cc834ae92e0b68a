//! Type name to documentation URL mapping.

use std::collections::BTreeMap;

const DOCS_BASE: &str = "https://www.postgresql.org/docs/current";

const BUILTIN_TYPES: &[(&str, &str)] = &[
    // Numeric
    ("smallint", "datatype-numeric.html#DATATYPE-INT"),
    ("integer", "datatype-numeric.html#DATATYPE-INT"),
    ("bigint", "datatype-numeric.html#DATATYPE-INT"),
    ("decimal", "datatype-numeric.html#DATATYPE-NUMERIC-DECIMAL"),
    ("numeric", "datatype-numeric.html#DATATYPE-NUMERIC-DECIMAL"),
    ("real", "datatype-numeric.html#DATATYPE-FLOAT"),
    ("double precision", "datatype-numeric.html#DATATYPE-FLOAT"),
    ("smallserial", "datatype-numeric.html#DATATYPE-SERIAL"),
    ("serial", "datatype-numeric.html#DATATYPE-SERIAL"),
    ("bigserial", "datatype-numeric.html#DATATYPE-SERIAL"),
    ("money", "datatype-money.html"),
    // Character
    ("character varying", "datatype-character.html"),
    ("character", "datatype-character.html"),
    ("text", "datatype-character.html"),
    ("name", "datatype-character.html"),
    ("bytea", "datatype-binary.html"),
    // Date/time
    ("timestamp without time zone", "datatype-datetime.html"),
    ("timestamp with time zone", "datatype-datetime.html"),
    ("date", "datatype-datetime.html"),
    ("time without time zone", "datatype-datetime.html"),
    ("time with time zone", "datatype-datetime.html"),
    ("interval", "datatype-datetime.html#DATATYPE-INTERVAL-INPUT"),
    ("boolean", "datatype-boolean.html"),
    // Geometric
    ("point", "datatype-geometric.html#DATATYPE-GEOMETRIC-POINTS"),
    ("line", "datatype-geometric.html#DATATYPE-LINE"),
    ("lseg", "datatype-geometric.html#DATATYPE-LSEG"),
    ("box", "datatype-geometric.html#DATATYPE-GEOMETRIC-BOXES"),
    ("path", "datatype-geometric.html#DATATYPE-GEOMETRIC-PATHS"),
    ("polygon", "datatype-geometric.html#DATATYPE-POLYGON"),
    ("circle", "datatype-geometric.html#DATATYPE-CIRCLE"),
    // Network
    ("cidr", "datatype-net-types.html#DATATYPE-CIDR"),
    ("inet", "datatype-net-types.html#DATATYPE-INET"),
    ("macaddr", "datatype-net-types.html#DATATYPE-MACADDR"),
    ("macaddr8", "datatype-net-types.html#DATATYPE-MACADDR8"),
    ("bit", "datatype-bit.html"),
    ("bit varying", "datatype-bit.html"),
    ("tsvector", "datatype-textsearch.html#DATATYPE-TSVECTOR"),
    ("tsquery", "datatype-textsearch.html#DATATYPE-TSQUERY"),
    ("uuid", "datatype-uuid.html"),
    ("xml", "datatype-xml.html"),
    ("json", "datatype-json.html"),
    ("jsonb", "datatype-json.html"),
    ("jsonpath", "datatype-json.html#DATATYPE-JSONPATH"),
    ("ARRAY", "arrays.html"),
    // Ranges
    ("int4range", "rangetypes.html#RANGETYPES-BUILTIN"),
    ("int8range", "rangetypes.html#RANGETYPES-BUILTIN"),
    ("numrange", "rangetypes.html#RANGETYPES-BUILTIN"),
    ("tsrange", "rangetypes.html#RANGETYPES-BUILTIN"),
    ("tstzrange", "rangetypes.html#RANGETYPES-BUILTIN"),
    ("daterange", "rangetypes.html#RANGETYPES-BUILTIN"),
    // Object identifiers
    ("oid", "datatype-oid.html"),
    ("regclass", "datatype-oid.html"),
    ("regproc", "datatype-oid.html"),
    ("regtype", "datatype-oid.html"),
    ("pg_lsn", "datatype-pg-lsn.html"),
];

/// Immutable lookup from normalized type name to documentation URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDocs {
    urls: BTreeMap<String, String>,
}

impl TypeDocs {
    /// A mapping with no entries; every type renders verbatim.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The PostgreSQL manual pages for the built-in types.
    pub fn postgres() -> Self {
        BUILTIN_TYPES
            .iter()
            .map(|(name, page)| (name.to_string(), format!("{}/{}", DOCS_BASE, page)))
            .collect()
    }

    pub fn with(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.insert(name.into(), url.into());
        self
    }

    /// Documentation URL for a column's type, if any.
    pub fn url_for(&self, data_type: &str) -> Option<&str> {
        self.urls.get(doc_key(data_type)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl FromIterator<(String, String)> for TypeDocs {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            urls: iter.into_iter().collect(),
        }
    }
}

/// Key under which a type is documented.
///
/// Bounded character types (`character (12)`) share the `character` entry.
pub fn doc_key(data_type: &str) -> &str {
    let length = data_type
        .strip_prefix("character (")
        .and_then(|rest| rest.strip_suffix(')'));
    match length {
        Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => "character",
        _ => data_type,
    }
}
