//! Database types and schema descriptors.

use std::collections::BTreeMap;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::{IsNull, ToSql, Type};

/// One result record, keyed by projected field name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Database engines supported by `BraidQL`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    /// PostgreSQL (relational engine).
    PostgreSQL,
    /// MongoDB (document engine).
    MongoDB,
}

impl DatabaseType {
    /// Get database type as string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MongoDB => "mongodb",
        }
    }

    /// Fixed adapter key used in plans and factory maps.
    #[must_use]
    pub const fn adapter_key(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MongoDB => "mongodb",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Introspected schema of one database, tagged by engine family.
///
/// `BTreeMap` keys keep the serialized form deterministic — the schema
/// JSON is embedded verbatim in model prompts and cache keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseSchema {
    /// Relational catalog: tables, columns, relationships.
    Relational {
        /// Database name (from the connection URL).
        name:          String,
        /// table name -> descriptor.
        tables:        BTreeMap<String, TableSchema>,
        /// Foreign-key edges across all tables.
        relationships: Vec<Relationship>,
    },
    /// Document catalog: sampled collections.
    Document {
        /// Database name.
        name:        String,
        /// collection name -> descriptor.
        collections: BTreeMap<String, CollectionSchema>,
    },
}

impl DatabaseSchema {
    /// Database name regardless of variant.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Relational { name, .. } | Self::Document { name, .. } => name,
        }
    }
}

/// One relational table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in catalog ordinal order.
    pub columns: Vec<ColumnSchema>,

    /// Index names.
    #[serde(default)]
    pub indexes: Vec<String>,

    /// Approximate row count; `0` when the count query failed.
    #[serde(default)]
    pub row_count: Option<i64>,
}

/// One relational column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,

    /// Catalog data type (e.g. `integer`, `character varying`).
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether the column is nullable.
    pub nullable: bool,

    /// Whether the column participates in the primary key.
    pub is_primary: bool,

    /// Referenced `table.column` when this column is a foreign key.
    #[serde(default)]
    pub foreign_key: Option<String>,
}

/// A foreign-key edge, both ends as `table.column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Referencing side.
    pub from: String,
    /// Referenced side.
    pub to:   String,
}

/// One sampled document collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// field name -> inferred descriptor.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,

    /// Total document count.
    #[serde(default)]
    pub count: u64,

    /// Index names.
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// One inferred document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Type name inferred from the first observed value.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Whether a null was observed for the field.
    pub nullable: bool,

    /// Up to 3 distinct truncated example values.
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Typed parameter wrapper preserving JSON value types on the PostgreSQL
/// wire protocol.
///
/// Plans carry parameters as JSON values; sending them through this enum
/// avoids protocol errors from type mismatches between JSON numbers and
/// the column types the generated SQL compares against.
#[derive(Debug, Clone)]
pub enum QueryParam {
    /// SQL NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit integer (BIGINT).
    BigInt(i64),
    /// 64-bit floating point (DOUBLE PRECISION).
    Double(f64),
    /// Text/string value (TEXT/VARCHAR).
    Text(String),
    /// JSON/JSONB value (for arrays and objects).
    Json(serde_json::Value),
}

impl From<serde_json::Value> for QueryParam {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::BigInt(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Double(f)
                } else {
                    Self::Text(n.to_string())
                }
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Self::Json(value),
        }
    }
}

impl ToSql for QueryParam {
    tokio_postgres::types::to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(b) => b.to_sql(ty, out),
            Self::BigInt(i) => i.to_sql(ty, out),
            Self::Double(f) => f.to_sql(ty, out),
            Self::Text(s) => s.to_sql(ty, out),
            Self::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_database_type_strings() {
        assert_eq!(DatabaseType::PostgreSQL.as_str(), "postgresql");
        assert_eq!(DatabaseType::PostgreSQL.adapter_key(), "postgres");
        assert_eq!(DatabaseType::MongoDB.adapter_key(), "mongodb");
    }

    #[test]
    fn test_schema_serializes_tagged() {
        let schema = DatabaseSchema::Document {
            name:        "shop".to_string(),
            collections: BTreeMap::new(),
        };
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "document");
        assert_eq!(value["name"], "shop");

        let back: DatabaseSchema = serde_json::from_value(value).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_relational_schema_round_trip() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "users".to_string(),
            TableSchema {
                columns:   vec![ColumnSchema {
                    name:        "id".to_string(),
                    data_type:   "integer".to_string(),
                    nullable:    false,
                    is_primary:  true,
                    foreign_key: None,
                }],
                indexes:   vec![],
                row_count: Some(3),
            },
        );
        let schema = DatabaseSchema::Relational {
            name: "app".to_string(),
            tables,
            relationships: vec![Relationship {
                from: "orders.user_id".to_string(),
                to:   "users.id".to_string(),
            }],
        };

        let encoded = serde_json::to_string(&schema).unwrap();
        assert!(encoded.contains("\"type\":\"relational\""));
        let decoded: DatabaseSchema = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn test_query_param_from_json() {
        assert!(matches!(QueryParam::from(json!(null)), QueryParam::Null));
        assert!(matches!(QueryParam::from(json!(true)), QueryParam::Bool(true)));
        assert!(matches!(QueryParam::from(json!(42)), QueryParam::BigInt(42)));
        assert!(matches!(QueryParam::from(json!("lagos")), QueryParam::Text(_)));
        assert!(matches!(QueryParam::from(json!([1, 2])), QueryParam::Json(_)));
    }
}
