use serde_json::Value;
use tracing::debug;

use crate::common::error::{ConsolidateError, Result};
use crate::pipeline::table::{Row, Schema, Table};
use crate::pipeline::timeline::VaccineTimeline;

/// Explicit state threaded through a stage chain. Stages communicate only
/// through the table they return and the declared fields here — never through
/// ambient state.
#[derive(Debug, Default)]
pub struct StageContext {
    pub location: String,
    /// Vaccine introduction timeline, when a stage derives or supplies one.
    pub timeline: Option<VaccineTimeline>,
}

impl StageContext {
    pub fn for_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            timeline: None,
        }
    }
}

/// One pure transform in a source pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, table: Table, ctx: &mut StageContext) -> Result<Table>;
}

/// An ordered chain of stages composed left-to-right.
///
/// A failing stage aborts the whole run for that source; the composer does
/// not catch failures, and a stage that produces an empty table is treated
/// as a failure too.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn run(&self, mut table: Table, ctx: &mut StageContext) -> Result<Table> {
        for stage in &self.stages {
            table = stage.apply(table, ctx)?;
            debug!(stage = stage.name(), rows = table.len(), "stage applied");
            if table.is_empty() {
                return Err(ConsolidateError::stage(
                    stage.name(),
                    "stage produced an empty table",
                ));
            }
        }
        Ok(table)
    }
}

/// Renames columns, updating the declared schema alongside the rows.
pub struct RenameColumns {
    mapping: Vec<(String, String)>,
}

impl RenameColumns {
    pub fn new<S: Into<String>>(mapping: impl IntoIterator<Item = (S, S)>) -> Self {
        Self {
            mapping: mapping
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }
}

impl Stage for RenameColumns {
    fn name(&self) -> &str {
        "rename_columns"
    }

    fn apply(&self, table: Table, _ctx: &mut StageContext) -> Result<Table> {
        let mut schema = table.schema().clone();
        for (from, to) in &self.mapping {
            schema = schema.rename(from, to);
        }
        let mapping = self.mapping.clone();
        table.map_rows(
            schema,
            move |row| {
                let mut out = Row::new();
                for (key, value) in row {
                    let key = mapping
                        .iter()
                        .find(|(from, _)| *from == key)
                        .map(|(_, to)| to.clone())
                        .unwrap_or(key);
                    out.insert(key, value);
                }
                Ok(out)
            },
            self.name(),
        )
    }
}

/// Assigns a constant value to every row — the enrichment idiom for
/// location, provenance, and static vaccine labels.
pub struct AssignColumn {
    column: String,
    value: Value,
}

impl AssignColumn {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl Stage for AssignColumn {
    fn name(&self) -> &str {
        "assign_column"
    }

    fn apply(&self, table: Table, _ctx: &mut StageContext) -> Result<Table> {
        let schema = table.schema().clone().with_column(&self.column);
        let column = self.column.clone();
        let value = self.value.clone();
        table.map_rows(
            schema,
            move |mut row| {
                row.insert(column.clone(), value.clone());
                Ok(row)
            },
            self.name(),
        )
    }
}

/// Drops rows failing a named predicate.
pub struct FilterRows {
    name: String,
    predicate: Box<dyn Fn(&Row) -> bool + Send + Sync>,
}

impl FilterRows {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Row) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl Stage for FilterRows {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, table: Table, _ctx: &mut StageContext) -> Result<Table> {
        let schema = table.schema().clone();
        let rows = table
            .into_rows()
            .into_iter()
            .filter(|row| (self.predicate)(row))
            .collect();
        Table::new(schema, rows)
    }
}

/// Keeps only the named columns, narrowing the schema to them.
pub struct SelectColumns {
    columns: Vec<String>,
}

impl SelectColumns {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Stage for SelectColumns {
    fn name(&self) -> &str {
        "select_columns"
    }

    fn apply(&self, table: Table, _ctx: &mut StageContext) -> Result<Table> {
        let schema = Schema::required(self.columns.clone());
        let columns = self.columns.clone();
        table.map_rows(
            schema,
            move |row| {
                Ok(row
                    .into_iter()
                    .filter(|(key, _)| columns.iter().any(|c| c == key))
                    .collect())
            },
            self.name(),
        )
    }
}

/// Adapter-specific transform expressed as a named closure.
pub struct FnStage {
    name: String,
    f: Box<dyn Fn(Table, &mut StageContext) -> Result<Table> + Send + Sync>,
}

impl FnStage {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(Table, &mut StageContext) -> Result<Table> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, table: Table, ctx: &mut StageContext) -> Result<Table> {
        (self.f)(table, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(rows: Vec<Value>, schema: Schema) -> Table {
        let rows = rows
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        Table::new(schema, rows).unwrap()
    }

    #[test]
    fn composes_left_to_right() {
        let input = table(
            vec![json!({"immunized": 10}), json!({"immunized": 20})],
            Schema::required(["immunized"]),
        );
        let pipeline = Pipeline::new()
            .stage(RenameColumns::new([("immunized", "people_fully_vaccinated")]))
            .stage(AssignColumn::new("location", "Romania"));

        let mut ctx = StageContext::for_location("Romania");
        let out = pipeline.run(input, &mut ctx).unwrap();
        assert_eq!(out.len(), 2);
        let row = &out.rows()[0];
        assert_eq!(row["people_fully_vaccinated"], json!(10));
        assert_eq!(row["location"], json!("Romania"));
    }

    #[test]
    fn empty_output_aborts_the_chain() {
        let input = table(vec![json!({"total": 0})], Schema::required(["total"]));
        let pipeline = Pipeline::new().stage(FilterRows::new("drop_zero_totals", |row| {
            row["total"].as_u64() != Some(0)
        }));

        let mut ctx = StageContext::default();
        let err = pipeline.run(input, &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            ConsolidateError::StageFailure { ref stage, .. } if stage == "drop_zero_totals"
        ));
    }

    #[test]
    fn stage_failure_propagates_uncaught() {
        let input = table(vec![json!({"total": 1})], Schema::required(["total"]));
        let pipeline = Pipeline::new()
            .stage(FnStage::new("explode", |_, _| {
                Err(ConsolidateError::stage("explode", "bad shape"))
            }))
            .stage(AssignColumn::new("location", "X"));

        let mut ctx = StageContext::default();
        assert!(pipeline.run(input, &mut ctx).is_err());
    }

    #[test]
    fn select_narrows_rows_and_schema() {
        let input = table(
            vec![json!({"date": "2021-01-01", "total": 5, "scratch": true})],
            Schema::required(["date", "total", "scratch"]),
        );
        let pipeline = Pipeline::new().stage(SelectColumns::new(["date", "total"]));

        let mut ctx = StageContext::default();
        let out = pipeline.run(input, &mut ctx).unwrap();
        let row = &out.rows()[0];
        assert!(!row.contains_key("scratch"));
        assert!(!out.schema().contains("scratch"));
        assert_eq!(row["total"], json!(5));
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let input = table(
            vec![json!({"total": 0}), json!({"total": 7})],
            Schema::required(["total"]),
        );
        let pipeline = Pipeline::new().stage(FilterRows::new("drop_zero_totals", |row| {
            row["total"].as_u64() != Some(0)
        }));
        let mut ctx = StageContext::default();
        let out = pipeline.run(input, &mut ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0]["total"], json!(7));
    }
}
