// src/model.rs
//! The canonical cross-source output shape.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;
use crate::vocab::{Canonical, Dimension};

/// One day of a series. `count` is the daily delta and may be negative when
/// an upstream revised a running total downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub count: i64,
    pub cumulative: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Cases,
    Deaths,
    Tests,
    PositiveTests,
    NegativeTests,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 5] = [
        SeriesKind::Cases,
        SeriesKind::Deaths,
        SeriesKind::Tests,
        SeriesKind::PositiveTests,
        SeriesKind::NegativeTests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Cases => "cases",
            SeriesKind::Deaths => "deaths",
            SeriesKind::Tests => "tests",
            SeriesKind::PositiveTests => "positive_tests",
            SeriesKind::NegativeTests => "negative_tests",
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Series {
    pub cases: Vec<DailyEntry>,
    pub deaths: Vec<DailyEntry>,
    pub tests: Vec<DailyEntry>,
    /// Tests with a positive / negative result; their sum is `tests`.
    pub positive_tests: Vec<DailyEntry>,
    pub negative_tests: Vec<DailyEntry>,
}

impl Series {
    pub fn get(&self, kind: SeriesKind) -> &[DailyEntry] {
        match kind {
            SeriesKind::Cases => &self.cases,
            SeriesKind::Deaths => &self.deaths,
            SeriesKind::Tests => &self.tests,
            SeriesKind::PositiveTests => &self.positive_tests,
            SeriesKind::NegativeTests => &self.negative_tests,
        }
    }

    pub(crate) fn slot(&mut self, kind: SeriesKind) -> &mut Vec<DailyEntry> {
        match kind {
            SeriesKind::Cases => &mut self.cases,
            SeriesKind::Deaths => &mut self.deaths,
            SeriesKind::Tests => &mut self.tests,
            SeriesKind::PositiveTests => &mut self.positive_tests,
            SeriesKind::NegativeTests => &mut self.negative_tests,
        }
    }
}

/// Counts for one dimension keyed by canonical label. Keys can only come
/// from a [`Canonical`] of that same dimension, so unmapped upstream labels
/// never land here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategoryTotal {
    #[serde(skip)]
    dimension: Dimension,
    counts: BTreeMap<&'static str, u64>,
}

impl CategoryTotal {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            counts: BTreeMap::new(),
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Adds to the bucket; several upstream labels may fold into one.
    /// A label from another dimension is rejected.
    pub fn add(&mut self, label: Canonical, n: u64) -> Result<(), Error> {
        if label.dimension() != self.dimension {
            return Err(Error::layout(format!(
                "{} label {:?} added to {} totals",
                label.dimension(),
                label.as_str(),
                self.dimension
            )));
        }
        let slot = self.counts.entry(label.as_str()).or_insert(0);
        *slot = slot
            .checked_add(n)
            .ok_or_else(|| Error::parse("count", n.to_string()))?;
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<u64> {
        self.counts.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Demographic totals. `None` (serialized as `null`) means the upstream does
/// not report that dimension, which is different from a zero count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DemographicTotals {
    pub gender: Option<CategoryTotal>,
    pub age_group: Option<CategoryTotal>,
    pub race_eth: Option<CategoryTotal>,
    pub transmission_cat: Option<CategoryTotal>,
}

impl DemographicTotals {
    pub fn get(&self, dimension: Dimension) -> Option<&CategoryTotal> {
        match dimension {
            Dimension::Gender => self.gender.as_ref(),
            Dimension::AgeGroup => self.age_group.as_ref(),
            Dimension::RaceEth => self.race_eth.as_ref(),
            Dimension::TransmissionCat => self.transmission_cat.as_ref(),
            Dimension::TestResult => None,
        }
    }

    /// `None` for a dimension that is not demographic.
    pub(crate) fn slot(&mut self, dimension: Dimension) -> Option<&mut Option<CategoryTotal>> {
        match dimension {
            Dimension::Gender => Some(&mut self.gender),
            Dimension::AgeGroup => Some(&mut self.age_group),
            Dimension::RaceEth => Some(&mut self.race_eth),
            Dimension::TransmissionCat => Some(&mut self.transmission_cat),
            Dimension::TestResult => None,
        }
    }
}

/// One county's finished record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountyRecord {
    pub name: String,
    pub source_url: String,
    pub update_time: NaiveDateTime,
    pub meta_from_source: String,
    pub meta_from_baypd: String,
    pub series: Series,
    pub case_totals: DemographicTotals,
    pub death_totals: DemographicTotals,
    /// Test counts by result; `null` when the upstream has no such table.
    pub tests_totals: Option<CategoryTotal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn category_totals_fold_and_serialize() {
        let unknown = Dimension::RaceEth.canonical("Unknown").unwrap();
        let asian = Dimension::RaceEth.canonical("Asian").unwrap();
        let mut t = CategoryTotal::new(Dimension::RaceEth);
        t.add(asian, 5).unwrap();
        t.add(unknown, 2).unwrap();
        t.add(unknown, 3).unwrap();
        assert_eq!(t.get("Unknown"), Some(5));
        assert_eq!(t.total(), 10);
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            json!({"Asian": 5, "Unknown": 5})
        );
    }

    #[test]
    fn unreported_dimensions_are_null() {
        let mut totals = DemographicTotals::default();
        *totals.slot(Dimension::Gender).unwrap() = Some(CategoryTotal::new(Dimension::Gender));
        assert!(totals.slot(Dimension::TestResult).is_none());
        assert_eq!(
            serde_json::to_value(&totals).unwrap(),
            json!({"gender": {}, "age_group": null, "race_eth": null, "transmission_cat": null})
        );
    }

    #[test]
    fn labels_from_another_dimension_are_rejected() {
        let mut t = CategoryTotal::new(Dimension::Gender);
        let err = t
            .add(Dimension::TransmissionCat.canonical("unknown").unwrap(), 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatDrift);
        assert!(t.is_empty());
        t.add(Dimension::Gender.canonical("unknown").unwrap(), 1).unwrap();
        assert_eq!(t.get("unknown"), Some(1));
    }
}
