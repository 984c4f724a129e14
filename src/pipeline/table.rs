use std::collections::BTreeSet;

use serde_json::Value;

use crate::common::error::{ConsolidateError, Result};

pub type Row = serde_json::Map<String, Value>;

/// Declared column set for a [`Table`], validated once at construction.
///
/// Required columns must be present on every row; a column outside the known
/// set means the upstream payload changed shape and the run must fail loudly
/// rather than silently coerce.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    required: BTreeSet<String>,
    known: BTreeSet<String>,
}

impl Schema {
    pub fn required<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let required: BTreeSet<String> = columns.into_iter().map(Into::into).collect();
        Self {
            known: required.clone(),
            required,
        }
    }

    /// Adds columns that may appear but are not required.
    pub fn optional<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.known.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, column: &str) -> bool {
        self.known.contains(column)
    }

    pub fn rename(&self, from: &str, to: &str) -> Self {
        let map = |set: &BTreeSet<String>| {
            set.iter()
                .map(|c| if c == from { to.to_string() } else { c.clone() })
                .collect()
        };
        Self {
            required: map(&self.required),
            known: map(&self.known),
        }
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.required.insert(column.to_string());
        self.known.insert(column.to_string());
        self
    }

    fn validate(&self, row: &Row, stage: &str) -> Result<()> {
        for column in &self.required {
            if !row.contains_key(column) {
                return Err(ConsolidateError::stage(
                    stage,
                    format!("missing required column '{column}'"),
                ));
            }
        }
        if let Some(unexpected) = row.keys().find(|k| !self.known.contains(*k)) {
            return Err(ConsolidateError::stage(
                stage,
                format!("unexpected column '{unexpected}' — check the upstream payload"),
            ));
        }
        Ok(())
    }
}

/// An ordered set of raw key-value records with a declared schema.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            schema.validate(row, "schema")?;
        }
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rebuilds the table with transformed rows, revalidating against the
    /// given schema.
    pub fn map_rows(
        self,
        schema: Schema,
        f: impl Fn(Row) -> Result<Row>,
        stage: &str,
    ) -> Result<Self> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in self.rows {
            let row = f(row)?;
            schema.validate(&row, stage)?;
            rows.push(row);
        }
        Ok(Self { schema, rows })
    }
}
