use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;

use crate::common::dates::parse_iso_date;
use crate::common::error::{ConsolidateError, Result};
use crate::domain::Series;

/// The closed set of vaccine brands this pipeline recognizes. Anything else
/// fails closed as [`Vaccine::parse`] rather than being silently coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vaccine {
    JohnsonJohnson,
    Moderna,
    Novavax,
    OxfordAstraZeneca,
    PfizerBioNTech,
    SinopharmBeijing,
    Sinovac,
    SputnikV,
}

/// Source-side spellings mapped onto canonical brands; several upstream
/// aliases collapse onto one brand (e.g. pediatric Pfizer doses).
static VACCINE_ALIASES: Lazy<HashMap<&'static str, Vaccine>> = Lazy::new(|| {
    HashMap::from([
        ("Johnson&Johnson", Vaccine::JohnsonJohnson),
        ("johnson_and_johnson", Vaccine::JohnsonJohnson),
        ("Moderna", Vaccine::Moderna),
        ("moderna", Vaccine::Moderna),
        ("Novavax", Vaccine::Novavax),
        ("Oxford/AstraZeneca", Vaccine::OxfordAstraZeneca),
        ("astra_zeneca", Vaccine::OxfordAstraZeneca),
        ("Pfizer/BioNTech", Vaccine::PfizerBioNTech),
        ("pfizer", Vaccine::PfizerBioNTech),
        ("pfizer_pediatric", Vaccine::PfizerBioNTech),
        ("Sinopharm/Beijing", Vaccine::SinopharmBeijing),
        ("Sinovac", Vaccine::Sinovac),
        ("Sputnik V", Vaccine::SputnikV),
    ])
});

impl Vaccine {
    pub fn label(&self) -> &'static str {
        match self {
            Vaccine::JohnsonJohnson => "Johnson&Johnson",
            Vaccine::Moderna => "Moderna",
            Vaccine::Novavax => "Novavax",
            Vaccine::OxfordAstraZeneca => "Oxford/AstraZeneca",
            Vaccine::PfizerBioNTech => "Pfizer/BioNTech",
            Vaccine::SinopharmBeijing => "Sinopharm/Beijing",
            Vaccine::Sinovac => "Sinovac",
            Vaccine::SputnikV => "Sputnik V",
        }
    }

    pub fn parse(name: &str) -> Result<Vaccine> {
        VACCINE_ALIASES
            .get(name.trim())
            .copied()
            .ok_or_else(|| ConsolidateError::UnrecognizedCategory(vec![name.to_string()]))
    }
}

/// Immutable mapping brand → first-effective date. Built once per pipeline
/// run; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaccineTimeline {
    // Kept sorted by brand label so every derived label is deterministic.
    starts: Vec<(Vaccine, NaiveDate)>,
}

impl VaccineTimeline {
    pub fn new(entries: impl IntoIterator<Item = (Vaccine, NaiveDate)>) -> Self {
        let mut starts: Vec<(Vaccine, NaiveDate)> = Vec::new();
        for (vaccine, date) in entries {
            match starts.iter_mut().find(|(v, _)| *v == vaccine) {
                Some((_, existing)) => {
                    if date < *existing {
                        *existing = date;
                    }
                }
                None => starts.push((vaccine, date)),
            }
        }
        starts.sort_by_key(|(v, _)| v.label());
        Self { starts }
    }

    /// Builds a timeline from `(name, iso_date)` pairs, collecting every
    /// unrecognized name into one failure.
    pub fn parse<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut parsed = Vec::new();
        let mut unknown = Vec::new();
        for (name, date) in entries {
            match Vaccine::parse(name) {
                Ok(vaccine) => parsed.push((vaccine, parse_iso_date(date)?)),
                Err(_) => unknown.push(name.to_string()),
            }
        }
        if !unknown.is_empty() {
            unknown.sort();
            return Err(ConsolidateError::UnrecognizedCategory(unknown));
        }
        Ok(Self::new(parsed))
    }

    /// Derives a timeline from per-brand dose counts: each brand starts on
    /// the first date its count is positive.
    pub fn from_first_doses(points: impl IntoIterator<Item = (Vaccine, NaiveDate, u64)>) -> Self {
        Self::new(
            points
                .into_iter()
                .filter(|&(_, _, count)| count > 0)
                .map(|(vaccine, date, _)| (vaccine, date)),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The comma-joined label of every brand effective on or before `date`,
    /// names ascending. Empty before any brand has started — "not yet
    /// known", not an error.
    pub fn label_on(&self, date: NaiveDate) -> String {
        self.starts
            .iter()
            .filter(|(_, start)| *start <= date)
            .map(|(vaccine, _)| vaccine.label())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Stamps every observation of the series with the label effective on
    /// its date.
    pub fn apply(&self, series: &mut Series) {
        for obs in series.observations_mut() {
            let label = self.label_on(obs.date);
            obs.vaccine = if label.is_empty() { None } else { Some(label) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn indonesia_timeline() -> VaccineTimeline {
        VaccineTimeline::parse([
            ("Sinovac", "2020-12-01"),
            ("Oxford/AstraZeneca", "2021-03-22"),
            ("Sinopharm/Beijing", "2021-05-18"),
            ("Moderna", "2021-07-17"),
        ])
        .unwrap()
    }

    #[test]
    fn label_is_empty_before_first_start_date() {
        let timeline = indonesia_timeline();
        assert_eq!(timeline.label_on(date(2020, 11, 30)), "");
    }

    #[test]
    fn label_accumulates_brands_in_name_order() {
        let timeline = indonesia_timeline();
        assert_eq!(timeline.label_on(date(2020, 12, 1)), "Sinovac");
        assert_eq!(
            timeline.label_on(date(2021, 3, 22)),
            "Oxford/AstraZeneca, Sinovac"
        );
        assert_eq!(
            timeline.label_on(date(2021, 8, 1)),
            "Moderna, Oxford/AstraZeneca, Sinopharm/Beijing, Sinovac"
        );
    }

    #[test]
    fn label_is_deterministic() {
        let timeline = indonesia_timeline();
        let d = date(2021, 6, 1);
        assert_eq!(timeline.label_on(d), timeline.label_on(d));
    }

    #[test]
    fn unknown_vaccine_names_fail_closed() {
        let err = VaccineTimeline::parse([("Sinovac", "2020-12-01"), ("kovivax", "2021-01-01")])
            .unwrap_err();
        match err {
            ConsolidateError::UnrecognizedCategory(names) => {
                assert_eq!(names, vec!["kovivax".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn aliases_collapse_onto_one_brand() {
        assert_eq!(Vaccine::parse("pfizer").unwrap(), Vaccine::PfizerBioNTech);
        assert_eq!(
            Vaccine::parse("pfizer_pediatric").unwrap(),
            Vaccine::PfizerBioNTech
        );

        let timeline = VaccineTimeline::new([
            (Vaccine::PfizerBioNTech, date(2021, 2, 1)),
            (Vaccine::PfizerBioNTech, date(2021, 1, 1)),
        ]);
        assert_eq!(timeline.label_on(date(2021, 1, 1)), "Pfizer/BioNTech");
    }

    #[test]
    fn from_first_doses_takes_first_positive_date() {
        let timeline = VaccineTimeline::from_first_doses([
            (Vaccine::Moderna, date(2021, 1, 1), 0),
            (Vaccine::Moderna, date(2021, 1, 5), 10),
            (Vaccine::Moderna, date(2021, 1, 9), 50),
        ]);
        assert_eq!(timeline.label_on(date(2021, 1, 4)), "");
        assert_eq!(timeline.label_on(date(2021, 1, 5)), "Moderna");
    }
}
