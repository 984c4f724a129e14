//! Montenegro reports per-dose totals through a dashboard JSON export: one
//! sheet per dose number, plus an epoch-millisecond refresh timestamp. An
//! incremental source — each run yields a single dated point.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{SourceAdapter, SourceKind, MONTENEGRO_SOURCE};
use crate::app::ports::FetchPort;
use crate::common::dates::{from_epoch_millis, parse_iso_date};
use crate::common::error::{ConsolidateError, Result};
use crate::domain::{MetricValue, Observation};
use crate::pipeline::stage::{AssignColumn, Pipeline};
use crate::pipeline::table::{Row, Schema, Table};

const SOURCE_URL: &str = "https://atlas.jifo.co/api/connectors/520021dc-c292-4903-9cdb-a2467f64ed97";
const SOURCE_URL_REF: &str = "https://www.covidodgovor.me/";
const SOURCE_LABEL: &str = "Government of Montenegro";
const VACCINE_LABEL: &str = "Oxford/AstraZeneca, Pfizer/BioNTech, Sinopharm/Beijing, Sputnik V";

pub struct Montenegro;

impl Montenegro {
    /// Reads the first cell of the sheet with the given name; a missing or
    /// empty sheet means no doses of that kind yet.
    fn sheet_value(payload: &Value, sheet: &str) -> Result<u64> {
        let names = payload["sheetNames"].as_array().ok_or_else(|| {
            ConsolidateError::stage("read", "payload has no 'sheetNames' array")
        })?;
        let Some(index) = names.iter().position(|n| n.as_str() == Some(sheet)) else {
            return Ok(0);
        };
        let rows = payload["data"][index].as_array().ok_or_else(|| {
            ConsolidateError::stage("read", format!("sheet '{sheet}' has no data array"))
        })?;
        match rows.first().and_then(|r| r.as_array()).and_then(|r| r.first()) {
            Some(cell) => cell
                .as_u64()
                .or_else(|| cell.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| {
                    ConsolidateError::stage("read", format!("sheet '{sheet}' cell is not a count"))
                }),
            None => Ok(0),
        }
    }

    fn parse_payload(payload: &Value) -> Result<Row> {
        let people_vaccinated = Self::sheet_value(payload, "1. doza")?;
        let people_fully_vaccinated = Self::sheet_value(payload, "2. doza")?;
        let total_boosters = Self::sheet_value(payload, "3. doza")?;
        let total_vaccinations = people_vaccinated + people_fully_vaccinated + total_boosters;

        let refreshed = payload["refreshed"].as_i64().ok_or_else(|| {
            ConsolidateError::stage("read", "payload has no 'refreshed' timestamp")
        })?;
        let date = from_epoch_millis(refreshed)?;

        let row = json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "total_vaccinations": total_vaccinations,
            "people_vaccinated": people_vaccinated,
            "people_fully_vaccinated": people_fully_vaccinated,
            "total_boosters": total_boosters,
        });
        Ok(row.as_object().cloned().unwrap())
    }

    fn schema() -> Schema {
        Schema::required([
            "date",
            "total_vaccinations",
            "people_vaccinated",
            "people_fully_vaccinated",
            "total_boosters",
        ])
    }
}

#[async_trait]
impl SourceAdapter for Montenegro {
    fn source_id(&self) -> &'static str {
        MONTENEGRO_SOURCE
    }

    fn location(&self) -> &'static str {
        "Montenegro"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Incremental
    }

    async fn read(&self, fetch: &dyn FetchPort) -> Result<Table> {
        let payload = fetch.fetch_json(SOURCE_URL).await?;
        let row = Self::parse_payload(&payload)?;
        Table::new(Self::schema(), vec![row])
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new()
            .stage(AssignColumn::new("location", self.location()))
            .stage(AssignColumn::new("vaccine", VACCINE_LABEL))
            .stage(AssignColumn::new("source_url", SOURCE_URL_REF))
    }

    fn observations(&self, table: Table) -> Result<Vec<Observation>> {
        table
            .into_rows()
            .into_iter()
            .map(|row| {
                let date = parse_iso_date(
                    row["date"]
                        .as_str()
                        .ok_or_else(|| ConsolidateError::MissingField("date".to_string()))?,
                )?;
                let mut obs = Observation::new(self.location(), date);
                for metric in crate::domain::Metric::ALL {
                    let value = row[metric.column()].as_u64().ok_or_else(|| {
                        ConsolidateError::MissingField(metric.column().to_string())
                    })?;
                    obs.metrics.set(metric, MetricValue::Known(value));
                }
                obs.vaccine = row["vaccine"].as_str().map(str::to_string);
                obs.source_url = row["source_url"].as_str().unwrap_or_default().to_string();
                obs.source_label = SOURCE_LABEL.to_string();
                Ok(obs)
            })
            .collect()
    }
}
