//! Indonesia publishes a daily JSON feed of cumulative first/second dose
//! counts. A batch source — every run re-emits the full history. Dose
//! breakdowns stop being derivable once single-shot vaccines roll out, so
//! `people_fully_vaccinated` goes explicitly unknown from that date, and the
//! consolidated series is reconciled against the WHO feed.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{SourceAdapter, SourceKind, INDONESIA_SOURCE};
use crate::app::ports::FetchPort;
use crate::common::dates::parse_iso_date;
use crate::common::error::{ConsolidateError, Result};
use crate::domain::{Metric, MetricValue, Observation};
use crate::pipeline::stage::{AssignColumn, FnStage, Pipeline};
use crate::pipeline::table::{Row, Schema, Table};
use crate::pipeline::timeline::VaccineTimeline;

const SOURCE_URL: &str = "https://data.covid19.go.id/public/api/pemeriksaan-vaksinasi.json";
const SOURCE_URL_REF: &str = "https://data.covid19.go.id/public/index.html";
const SOURCE_LABEL: &str = "Government of Indonesia";

/// Start of the single-shot rollout; dose-two counts no longer identify the
/// fully vaccinated from here on.
const SINGLE_SHOT_CUTOVER: &str = "2021-09-11";

pub struct Indonesia;

impl Indonesia {
    /// Schema of the upstream daily records. An unexpected key means the
    /// feed changed shape and the run must fail for review.
    fn raw_schema() -> Schema {
        Schema::required([
            "key_as_string",
            "jumlah_jumlah_vaksinasi_1_kum",
            "jumlah_jumlah_vaksinasi_2_kum",
        ])
        .optional(["key", "doc_count", "jumlah_vaksinasi_1", "jumlah_vaksinasi_2"])
    }

    fn cumulative(record: &Row, field: &str) -> Result<u64> {
        record[field]["value"].as_u64().ok_or_else(|| {
            ConsolidateError::stage("extract_doses", format!("'{field}' has no numeric value"))
        })
    }

    fn extract_doses(table: Table) -> Result<Table> {
        let schema = Schema::required(["date", "dose_1", "dose_2"]);
        let mut rows = Vec::with_capacity(table.len());
        for record in table.rows() {
            let date = record["key_as_string"].as_str().ok_or_else(|| {
                ConsolidateError::stage("extract_doses", "'key_as_string' is not a string")
            })?;
            let row = json!({
                "date": parse_iso_date(date)?.format("%Y-%m-%d").to_string(),
                "dose_1": Self::cumulative(record, "jumlah_jumlah_vaksinasi_1_kum")?,
                "dose_2": Self::cumulative(record, "jumlah_jumlah_vaksinasi_2_kum")?,
            });
            rows.push(row.as_object().cloned().unwrap());
        }
        Table::new(schema, rows)
    }

    fn derive_metrics(table: Table) -> Result<Table> {
        let cutover = parse_iso_date(SINGLE_SHOT_CUTOVER).expect("valid cutover date");
        let schema = Schema::required([
            "date",
            "total_vaccinations",
            "people_vaccinated",
            "people_fully_vaccinated",
        ]);
        let mut rows = Vec::with_capacity(table.len());
        for row in table.rows() {
            let date = parse_iso_date(row["date"].as_str().unwrap_or_default())?;
            let dose_1 = row["dose_1"].as_u64().unwrap_or_default();
            let dose_2 = row["dose_2"].as_u64().unwrap_or_default();
            // Booster data is missing upstream, so the total is a partial
            // estimate of doses one and two.
            let derived = json!({
                "date": row["date"],
                "total_vaccinations": dose_1 + dose_2,
                "people_vaccinated": dose_1,
                "people_fully_vaccinated": if date >= cutover {
                    Value::Null
                } else {
                    json!(dose_2)
                },
            });
            rows.push(derived.as_object().cloned().unwrap());
        }
        Table::new(schema, rows)
    }

    fn metric_value(row: &Row, metric: Metric) -> MetricValue {
        match row.get(metric.column()) {
            Some(Value::Number(n)) => n.as_u64().map(MetricValue::Known).unwrap_or_default(),
            _ => MetricValue::Unknown,
        }
    }
}

#[async_trait]
impl SourceAdapter for Indonesia {
    fn source_id(&self) -> &'static str {
        INDONESIA_SOURCE
    }

    fn location(&self) -> &'static str {
        "Indonesia"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Batch
    }

    fn reconcile_metric(&self) -> Option<Metric> {
        Some(Metric::TotalVaccinations)
    }

    fn vaccine_timeline(&self) -> Result<Option<VaccineTimeline>> {
        Ok(Some(VaccineTimeline::parse([
            ("Sinovac", "2020-12-01"),
            ("Oxford/AstraZeneca", "2021-03-22"),
            ("Sinopharm/Beijing", "2021-05-18"),
            ("Moderna", "2021-07-17"),
            ("Pfizer/BioNTech", "2021-08-29"),
            ("Johnson&Johnson", "2021-09-11"),
            ("Novavax", "2021-11-27"),
        ])?))
    }

    async fn read(&self, fetch: &dyn FetchPort) -> Result<Table> {
        let payload = fetch.fetch_json(SOURCE_URL).await?;
        let records = payload["vaksinasi"]["harian"].as_array().ok_or_else(|| {
            ConsolidateError::stage("read", "payload has no 'vaksinasi.harian' array")
        })?;
        let rows: Vec<Row> = records
            .iter()
            .map(|r| {
                r.as_object().cloned().ok_or_else(|| {
                    ConsolidateError::stage("read", "daily record is not an object")
                })
            })
            .collect::<Result<_>>()?;
        Table::new(Self::raw_schema(), rows)
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new()
            .stage(FnStage::new("extract_doses", |table, _| {
                Self::extract_doses(table)
            }))
            .stage(FnStage::new("derive_metrics", |table, _| {
                Self::derive_metrics(table)
            }))
            .stage(AssignColumn::new("location", self.location()))
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
                for metric in [
                    Metric::TotalVaccinations,
                    Metric::PeopleVaccinated,
                    Metric::PeopleFullyVaccinated,
                ] {
                    obs.metrics.set(metric, Self::metric_value(&row, metric));
                }
                obs.source_url = row["source_url"].as_str().unwrap_or_default().to_string();
                obs.source_label = SOURCE_LABEL.to_string();
                Ok(obs)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::StageContext;

    fn daily(date: &str, dose_1: u64, dose_2: u64) -> Value {
        json!({
            "key_as_string": date,
            "key": 0,
            "doc_count": 1,
            "jumlah_vaksinasi_1": {"value": 0},
            "jumlah_vaksinasi_2": {"value": 0},
            "jumlah_jumlah_vaksinasi_1_kum": {"value": dose_1},
            "jumlah_jumlah_vaksinasi_2_kum": {"value": dose_2},
        })
    }

    fn raw_table(records: Vec<Value>) -> Table {
        let rows = records
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        Table::new(Indonesia::raw_schema(), rows).unwrap()
    }

    #[test]
    fn new_upstream_column_fails_the_schema_check() {
        let mut record = daily("2021-07-01", 100, 50).as_object().unwrap().clone();
        record.insert("jumlah_vaksinasi_3".to_string(), json!({"value": 1}));
        let err = Table::new(Indonesia::raw_schema(), vec![record]).unwrap_err();
        assert!(matches!(err, ConsolidateError::StageFailure { .. }));
    }

    #[test]
    fn derives_partial_totals_from_doses() {
        let adapter = Indonesia;
        let table = raw_table(vec![daily("2021-07-01T00:00:00.000Z", 100, 40)]);
        let mut ctx = StageContext::for_location(adapter.location());
        let table = adapter.pipeline().run(table, &mut ctx).unwrap();
        let observations = adapter.observations(table).unwrap();

        let obs = &observations[0];
        assert_eq!(obs.date, NaiveDate::from_ymd_opt(2021, 7, 1).unwrap());
        assert_eq!(obs.metrics.total_vaccinations, MetricValue::Known(140));
        assert_eq!(obs.metrics.people_vaccinated, MetricValue::Known(100));
        assert_eq!(obs.metrics.people_fully_vaccinated, MetricValue::Known(40));
        assert_eq!(obs.metrics.total_boosters, MetricValue::Unknown);
    }

    #[test]
    fn fully_vaccinated_goes_unknown_after_cutover() {
        let adapter = Indonesia;
        let table = raw_table(vec![
            daily("2021-09-10", 100, 40),
            daily("2021-09-11", 110, 45),
        ]);
        let mut ctx = StageContext::for_location(adapter.location());
        let table = adapter.pipeline().run(table, &mut ctx).unwrap();
        let observations = adapter.observations(table).unwrap();

        assert_eq!(
            observations[0].metrics.people_fully_vaccinated,
            MetricValue::Known(40)
        );
        assert_eq!(
            observations[1].metrics.people_fully_vaccinated,
            MetricValue::Unknown
        );
    }

    #[test]
    fn timeline_covers_campaign_rollout() {
        let timeline = Indonesia.vaccine_timeline().unwrap().unwrap();
        assert_eq!(
            timeline.label_on(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
            "Sinovac"
        );
        let august = timeline.label_on(NaiveDate::from_ymd_opt(2021, 8, 30).unwrap());
        assert!(august.contains("Pfizer/BioNTech"));
        assert!(august.contains("Moderna"));
    }
}
