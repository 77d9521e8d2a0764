//! Source schemas and the registry that serves them.
//!
//! Schemas are either declared here for the built-in report sources or read
//! from Spark `StructType` JSON documents (the layout the StatCan schema store
//! publishes). The registry is assembled once at startup and then shared
//! read-only through the pipeline context.

use crate::error::{PipelineError, Result};
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Names of the built-in report sources.
pub mod sources {
    pub const CPI: &str = "cpi";
    pub const RETAIL_TRADE: &str = "retail_trade";
    pub const YAHOO_FINANCE: &str = "yahoo_finance";
    pub const TSX: &str = "tsx";
    pub const BUSINESS_INDICATORS: &str = "business_indicators";
    pub const HOUSEHOLD_CONSUMPTION: &str = "household_consumption";
}

/// A named, typed column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value_type: ValueType,
}

impl Column {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Column {
            name: name.into(),
            value_type,
        }
    }
}

/// Ordered list of unique columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema, rejecting duplicate column names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Schema { columns })
    }

    /// Convenience constructor from `(name, type)` pairs.
    pub fn from_pairs(pairs: &[(&str, ValueType)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|(name, value_type)| Column::new(*name, *value_type))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Parses a Spark `StructType` JSON document.
    pub fn from_json(source: &str, text: &str) -> Result<Self> {
        let doc: StructTypeDoc = serde_json::from_str(text)?;
        if doc.kind != "struct" {
            return Err(PipelineError::SchemaMismatch {
                source: source.to_string(),
                detail: format!("expected a struct schema, found '{}'", doc.kind),
            });
        }

        let mut columns = Vec::with_capacity(doc.fields.len());
        for field in doc.fields {
            let value_type = spark_type(&field.data_type).ok_or_else(|| {
                PipelineError::SchemaMismatch {
                    source: source.to_string(),
                    detail: format!(
                        "column '{}' has unsupported type '{}'",
                        field.name, field.data_type
                    ),
                }
            })?;
            columns.push(Column::new(field.name, value_type));
        }

        Schema::new(columns)
    }

    /// Serializes to a Spark `StructType` JSON document.
    pub fn to_json(&self) -> Result<String> {
        let doc = StructTypeDoc {
            kind: "struct".to_string(),
            fields: self
                .columns
                .iter()
                .map(|column| StructFieldDoc {
                    name: column.name.clone(),
                    data_type: spark_type_name(column.value_type).to_string(),
                    nullable: true,
                    metadata: serde_json::Map::new(),
                })
                .collect(),
        };
        Ok(serde_json::to_string(&doc)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StructTypeDoc {
    #[serde(rename = "type")]
    kind: String,
    fields: Vec<StructFieldDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StructFieldDoc {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default = "default_nullable")]
    nullable: bool,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_nullable() -> bool {
    true
}

fn spark_type(name: &str) -> Option<ValueType> {
    match name {
        "string" => Some(ValueType::Text),
        "integer" | "long" | "short" | "byte" => Some(ValueType::Integer),
        "double" | "float" => Some(ValueType::Float),
        "date" | "timestamp" => Some(ValueType::Date),
        other if other.starts_with("decimal") => Some(ValueType::Float),
        _ => None,
    }
}

fn spark_type_name(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Text => "string",
        ValueType::Integer => "integer",
        ValueType::Float => "double",
        ValueType::Date => "date",
    }
}

/// Registry of schemas keyed by source name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        SchemaRegistry {
            schemas: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the schemas of every built-in report source.
    pub fn builtin() -> Self {
        let mut registry = SchemaRegistry::new();
        for (name, schema) in builtin_schemas() {
            registry.schemas.insert(name.to_string(), schema);
        }
        registry
    }

    /// Adds or replaces a schema.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    /// Adds or replaces a schema parsed from a `StructType` JSON document.
    pub fn with_json(self, name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let schema = Schema::from_json(&name, text)?;
        Ok(self.with_schema(name, schema))
    }

    /// Loads every `*.json` file in `dir`; the file stem is the source name.
    pub fn load_dir<P: AsRef<Path>>(mut self, dir: P) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)?;
            let schema = Schema::from_json(name, &text)?;
            tracing::debug!("Loaded schema '{}' from {}", name, path.display());
            self.schemas.insert(name.to_string(), schema);
        }

        Ok(self)
    }

    /// Looks up the schema for a source.
    ///
    /// # Errors
    /// Returns `PipelineError::UnknownSource` if the source is not registered.
    pub fn lookup(&self, source: &str) -> Result<&Schema> {
        self.schemas
            .get(source)
            .ok_or_else(|| PipelineError::UnknownSource(source.to_string()))
    }

    pub fn contains(&self, source: &str) -> bool {
        self.schemas.contains_key(source)
    }

    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }
}

fn statcan_columns(dimensions: &[&'static str], value_type: ValueType) -> Vec<(&'static str, ValueType)> {
    use ValueType::{Float, Integer, Text};

    let mut columns = vec![("REF_DATE", Text), ("GEO", Text), ("DGUID", Text)];
    columns.extend(dimensions.iter().map(|name| (*name, Text)));
    columns.extend([
        ("UOM", Text),
        ("UOM_ID", Integer),
        ("SCALAR_FACTOR", Text),
        ("SCALAR_ID", Integer),
        ("VECTOR", Text),
        ("COORDINATE", Float),
        ("VALUE", value_type),
        ("STATUS", Text),
        ("SYMBOL", Text),
        ("TERMINATED", Text),
        ("DECIMALS", Integer),
    ]);
    columns
}

fn builtin_schemas() -> Vec<(&'static str, Schema)> {
    use ValueType::{Float, Integer, Text};

    let statcan = |dimensions: &[&'static str], value_type: ValueType| -> Schema {
        let pairs = statcan_columns(dimensions, value_type);
        Schema {
            columns: pairs
                .into_iter()
                .map(|(name, value_type)| Column::new(name, value_type))
                .collect(),
        }
    };

    let mut retail = statcan(
        &[
            "North American Industry Classification System (NAICS)",
            "Adjustments",
        ],
        Float,
    );
    // The retail table publishes coordinates as dotted paths
    if let Some(column) = retail.columns.iter_mut().find(|c| c.name == "COORDINATE") {
        column.value_type = Text;
    }

    let yahoo = Schema {
        columns: [
            ("REF_DATE", Text),
            ("Open", Float),
            ("High", Float),
            ("Low", Float),
            ("Close", Float),
            ("Adj Close", Float),
            ("Volume", Float),
        ]
        .into_iter()
        .map(|(name, value_type)| Column::new(name, value_type))
        .collect(),
    };

    vec![
        (sources::CPI, statcan(&["Products and product groups"], Float)),
        (sources::RETAIL_TRADE, retail),
        (sources::YAHOO_FINANCE, yahoo),
        (
            sources::TSX,
            statcan(&["Toronto Stock Exchange Statistics"], Float),
        ),
        (
            sources::BUSINESS_INDICATORS,
            statcan(&["Leading indicators", "Composite index"], Float),
        ),
        (
            sources::HOUSEHOLD_CONSUMPTION,
            statcan(&["Prices", "Seasonal adjustment", "Estimates"], Integer),
        ),
    ]
}
