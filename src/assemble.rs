// src/assemble.rs

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::Error;
use crate::model::{CategoryTotal, CountyRecord, DailyEntry, DemographicTotals, Series, SeriesKind};
use crate::sources::{Coverage, SourceCommon};
use crate::vocab::Dimension;

/// Record header fields. `update_time` comes from the upstream itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub source_url: String,
    pub update_time: Option<NaiveDateTime>,
    pub meta_from_source: String,
    pub meta_from_baypd: String,
}

impl Header {
    pub fn new(
        common: &SourceCommon,
        update_time: Option<NaiveDateTime>,
        meta_from_source: String,
    ) -> Self {
        Self {
            name: common.name.clone(),
            source_url: common.source_url.clone(),
            update_time,
            meta_from_source,
            meta_from_baypd: common.meta_from_baypd.clone(),
        }
    }
}

/// One finished piece of a record, produced by an adapter stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Series(SeriesKind, Vec<DailyEntry>),
    CaseTotals(Dimension, CategoryTotal),
    DeathTotals(Dimension, CategoryTotal),
    TestsTotals(CategoryTotal),
}

fn place(
    totals: &mut DemographicTotals,
    declared: &[Dimension],
    dimension: Dimension,
    value: CategoryTotal,
    field: &str,
) -> Result<(), Error> {
    if !declared.contains(&dimension) {
        return Err(Error::layout(format!(
            "{field}.{dimension} produced but declared not reported"
        )));
    }
    if value.dimension() != dimension {
        return Err(Error::layout(format!(
            "{field}.{dimension} holds {} counts",
            value.dimension()
        )));
    }
    let slot = totals
        .slot(dimension)
        .ok_or_else(|| Error::layout(format!("{field}.{dimension} is not demographic")))?;
    if slot.is_some() {
        return Err(Error::layout(format!("{field}.{dimension} produced twice")));
    }
    *slot = Some(value);
    Ok(())
}

fn check_declared(totals: &DemographicTotals, declared: &[Dimension], field: &str) -> Result<(), Error> {
    match declared.iter().find(|d| totals.get(**d).is_none()) {
        Some(d) => Err(Error::layout(format!("{field}.{d} declared but missing"))),
        None => Ok(()),
    }
}

/// Merge fragments into a record. Pure structure: every declared fragment
/// must be present exactly once, undeclared ones are rejected, and a missing
/// upstream timestamp is an error rather than "now".
pub fn assemble(
    header: Header,
    coverage: &Coverage,
    fragments: Vec<Fragment>,
) -> Result<CountyRecord, Error> {
    let update_time = header
        .update_time
        .ok_or_else(|| Error::MissingMetadata(header.name.clone()))?;

    let mut series = Series::default();
    let mut seen = BTreeSet::new();
    let mut case_totals = DemographicTotals::default();
    let mut death_totals = DemographicTotals::default();
    let mut tests_totals = None;

    for fragment in fragments {
        match fragment {
            Fragment::Series(kind, entries) => {
                if !coverage.series.contains(&kind) {
                    return Err(Error::layout(format!(
                        "series.{kind} produced but declared not reported"
                    )));
                }
                if !seen.insert(kind) {
                    return Err(Error::layout(format!("series.{kind} produced twice")));
                }
                *series.slot(kind) = entries;
            }
            Fragment::CaseTotals(d, t) => {
                place(&mut case_totals, coverage.case_totals, d, t, "case_totals")?
            }
            Fragment::DeathTotals(d, t) => {
                place(&mut death_totals, coverage.death_totals, d, t, "death_totals")?
            }
            Fragment::TestsTotals(t) => {
                if !coverage.tests_totals || t.dimension() != Dimension::TestResult {
                    return Err(Error::layout("tests_totals produced but declared not reported"));
                }
                if tests_totals.replace(t).is_some() {
                    return Err(Error::layout("tests_totals produced twice"));
                }
            }
        }
    }

    if let Some(kind) = coverage.series.iter().find(|k| !seen.contains(*k)) {
        return Err(Error::layout(format!("series.{kind} declared but missing")));
    }
    check_declared(&case_totals, coverage.case_totals, "case_totals")?;
    check_declared(&death_totals, coverage.death_totals, "death_totals")?;
    if coverage.tests_totals && tests_totals.is_none() {
        return Err(Error::layout("tests_totals declared but missing"));
    }

    debug!(name = %header.name, %update_time, "assembled record");
    Ok(CountyRecord {
        name: header.name,
        source_url: header.source_url,
        update_time,
        meta_from_source: header.meta_from_source,
        meta_from_baypd: header.meta_from_baypd,
        series,
        case_totals,
        death_totals,
        tests_totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parse::parse_timestamp;
    use chrono::NaiveDate;

    const COVERAGE: Coverage = Coverage {
        series: &[SeriesKind::Cases],
        case_totals: &[Dimension::Gender],
        death_totals: &[],
        tests_totals: false,
    };

    fn header(update: Option<&str>) -> Header {
        Header {
            name: "Test County".into(),
            source_url: "https://example.test/".into(),
            update_time: update.map(|t| parse_timestamp(t).unwrap()),
            meta_from_source: "from source".into(),
            meta_from_baypd: "from us".into(),
        }
    }

    fn fragments() -> Vec<Fragment> {
        let mut gender = CategoryTotal::new(Dimension::Gender);
        gender.add(Dimension::Gender.canonical("male").unwrap(), 4).unwrap();
        vec![
            Fragment::Series(
                SeriesKind::Cases,
                vec![DailyEntry {
                    date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
                    count: 4,
                    cumulative: 4,
                }],
            ),
            Fragment::CaseTotals(Dimension::Gender, gender),
        ]
    }

    #[test]
    fn merges_and_marks_unreported() {
        let rec = assemble(header(Some("2020-05-06T10:00:00")), &COVERAGE, fragments()).unwrap();
        assert_eq!(rec.series.cases.len(), 1);
        assert!(rec.series.deaths.is_empty());
        assert_eq!(rec.case_totals.gender.as_ref().unwrap().get("male"), Some(4));
        assert!(rec.case_totals.age_group.is_none());
        assert_eq!(rec.death_totals, DemographicTotals::default());

        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["update_time"], "2020-05-06T10:00:00");
        assert!(v["death_totals"]["gender"].is_null());
        assert!(v["tests_totals"].is_null());
        assert_eq!(v["series"]["cases"][0]["date"], "2020-05-01");
    }

    #[test]
    fn no_timestamp_no_record() {
        let err = assemble(header(None), &COVERAGE, fragments()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    }

    #[test]
    fn coverage_is_enforced() {
        let mut frags = fragments();
        frags.pop();
        let err = assemble(header(Some("2020-05-06")), &COVERAGE, frags).unwrap_err();
        assert!(err.to_string().contains("case_totals.gender declared but missing"));

        let mut frags = fragments();
        frags.push(Fragment::DeathTotals(
            Dimension::Gender,
            CategoryTotal::new(Dimension::Gender),
        ));
        assert!(assemble(header(Some("2020-05-06")), &COVERAGE, frags).is_err());

        let mut frags = fragments();
        frags.push(frags[0].clone());
        assert!(assemble(header(Some("2020-05-06")), &COVERAGE, frags).is_err());
    }

    #[test]
    fn tests_totals_follow_coverage() {
        let with_tests = Coverage {
            tests_totals: true,
            ..COVERAGE
        };
        let mut results = CategoryTotal::new(Dimension::TestResult);
        results
            .add(Dimension::TestResult.canonical("positive").unwrap(), 9)
            .unwrap();

        let err = assemble(header(Some("2020-05-06")), &with_tests, fragments()).unwrap_err();
        assert!(err.to_string().contains("tests_totals declared but missing"));

        let mut frags = fragments();
        frags.push(Fragment::TestsTotals(results.clone()));
        let rec = assemble(header(Some("2020-05-06")), &with_tests, frags.clone()).unwrap();
        assert_eq!(rec.tests_totals.unwrap().get("positive"), Some(9));

        // undeclared
        assert!(assemble(header(Some("2020-05-06")), &COVERAGE, frags).is_err());
    }

    #[test]
    fn totals_must_match_their_slot() {
        let mut frags = fragments();
        frags.pop();
        frags.push(Fragment::CaseTotals(
            Dimension::Gender,
            CategoryTotal::new(Dimension::AgeGroup),
        ));
        let err = assemble(header(Some("2020-05-06")), &COVERAGE, frags).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatDrift);
    }
}
