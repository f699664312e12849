// src/sources/san_francisco.rs
//! San Francisco: Socrata JSON datasets on data.sfgov.org.
//!
//! Series come back as one row per date with daily counts; cumulative values
//! are not published and are computed here. The testing dataset gives total
//! and positive tests per day; negatives are the difference. Demographic
//! totals use grouped `sum(...)` queries. SF publishes no death breakdowns
//! and no test-result totals.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::table::map_totals;
use super::{Coverage, SourceCommon, SourceId};
use crate::assemble::{assemble, Fragment, Header};
use crate::error::{Error, SourceError, Stage, StageExt};
use crate::extract::{json_rows, JsonRow};
use crate::fetch::Fetch;
use crate::model::{CategoryTotal, CountyRecord, DailyEntry, SeriesKind};
use crate::parse::{parse_count, parse_date, parse_timestamp};
use crate::series::{reconstruct, Convention, Observation};
use crate::vocab::{Dimension, Vocabulary};

const ID: SourceId = SourceId::SanFrancisco;

/// Socrata returns 1000 rows unless told otherwise.
const ROW_LIMIT: &str = "50000";

pub const COVERAGE: Coverage = Coverage {
    series: &SeriesKind::ALL,
    case_totals: &Dimension::DEMOGRAPHIC,
    death_totals: &[],
    tests_totals: false,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SanFranciscoConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    pub metadata_url: String,
    pub transmission_url: String,
    pub age_gender_url: String,
    pub race_ethnicity_url: String,
    pub tests_url: String,
}

/// The bits of the Socrata view metadata we use.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewMetadata {
    data_updated_at: Option<String>,
    #[serde(default)]
    description: String,
}

type Query = Vec<(&'static str, &'static str)>;

fn test_row(r: &JsonRow) -> Result<(NaiveDate, u64, u64), Error> {
    Ok((
        parse_date(&r.text("date")?)?,
        parse_count(&r.text("tests")?)?,
        parse_count(&r.text("pos")?)?,
    ))
}

#[derive(Debug)]
pub struct SanFrancisco {
    config: SanFranciscoConfig,
    vocab: Vocabulary,
}

impl SanFrancisco {
    pub fn new(config: SanFranciscoConfig) -> Result<Self, Error> {
        let vocab = config.common.vocabulary(
            &COVERAGE,
            &[
                config.metadata_url.as_str(),
                config.transmission_url.as_str(),
                config.age_gender_url.as_str(),
                config.race_ethnicity_url.as_str(),
                config.tests_url.as_str(),
            ],
        )?;
        Ok(Self { config, vocab })
    }

    pub fn config(&self) -> &SanFranciscoConfig {
        &self.config
    }

    fn series_query(&self, kind: SeriesKind) -> (&str, Query) {
        match kind {
            SeriesKind::Cases | SeriesKind::Deaths => {
                let disposition = if kind == SeriesKind::Cases {
                    "Confirmed"
                } else {
                    "Death"
                };
                (
                    self.config.transmission_url.as_str(),
                    vec![
                        ("case_disposition", disposition),
                        ("$select", "date, sum(case_count) as count"),
                        ("$group", "date"),
                        ("$order", "date"),
                        ("$limit", ROW_LIMIT),
                    ],
                )
            }
            SeriesKind::Tests | SeriesKind::PositiveTests | SeriesKind::NegativeTests => (
                self.config.tests_url.as_str(),
                vec![
                    ("$select", "result_date as date, tests, pos"),
                    ("$order", "result_date"),
                    ("$limit", ROW_LIMIT),
                ],
            ),
        }
    }

    fn totals_query(&self, dimension: Dimension) -> (&str, Query) {
        let c = &self.config;
        match dimension {
            Dimension::Gender => (
                c.age_gender_url.as_str(),
                vec![
                    ("$select", "gender as label, sum(confirmed_cases) as count"),
                    ("$group", "gender"),
                ],
            ),
            Dimension::AgeGroup => (
                c.age_gender_url.as_str(),
                vec![
                    ("$select", "age_group as label, sum(confirmed_cases) as count"),
                    ("$group", "age_group"),
                ],
            ),
            Dimension::RaceEth => (
                c.race_ethnicity_url.as_str(),
                vec![
                    ("$select", "race_ethnicity as label, sum(confirmed_cases) as count"),
                    ("$group", "race_ethnicity"),
                ],
            ),
            Dimension::TransmissionCat => (
                c.transmission_url.as_str(),
                vec![
                    ("case_disposition", "Confirmed"),
                    ("$select", "transmission_category as label, sum(case_count) as count"),
                    ("$group", "transmission_category"),
                ],
            ),
        }
    }

    async fn rows<F: Fetch>(
        &self,
        fetcher: &F,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<JsonRow>, SourceError> {
        let body = fetcher.get_text(url, query).await.at(ID, Stage::Fetch)?;
        json_rows(&body).at(ID, Stage::Extract)
    }

    async fn series<F: Fetch>(
        &self,
        fetcher: &F,
        kind: SeriesKind,
    ) -> Result<Vec<DailyEntry>, SourceError> {
        let (url, query) = self.series_query(kind);
        let rows = self.rows(fetcher, url, &query).await?;
        let obs = rows
            .iter()
            .map(|r| {
                Ok(Observation::new(
                    parse_date(&r.text("date")?)?,
                    parse_count(&r.text("count")?)?,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()
            .at(ID, Stage::Extract)?;
        let entries = reconstruct(&obs, Convention::DailyDelta).at(ID, Stage::Reconstruct)?;
        debug!(%kind, entries = entries.len(), "series");
        Ok(entries)
    }

    /// Total, positive and negative test series from one testing query.
    async fn test_series<F: Fetch>(&self, fetcher: &F) -> Result<Vec<Fragment>, SourceError> {
        let (url, query) = self.series_query(SeriesKind::Tests);
        let rows = self.rows(fetcher, url, &query).await?;
        let (mut tests, mut positive, mut negative) = (Vec::new(), Vec::new(), Vec::new());
        for r in &rows {
            let (date, total, pos) = test_row(r).at(ID, Stage::Extract)?;
            let neg = total
                .checked_sub(pos)
                .ok_or_else(|| {
                    Error::layout(format!("{pos} positive of {total} tests on {date}"))
                })
                .at(ID, Stage::Extract)?;
            tests.push(Observation::new(date, total));
            positive.push(Observation::new(date, pos));
            negative.push(Observation::new(date, neg));
        }

        let mut fragments = Vec::with_capacity(3);
        for (kind, obs) in [
            (SeriesKind::Tests, tests),
            (SeriesKind::PositiveTests, positive),
            (SeriesKind::NegativeTests, negative),
        ] {
            let entries = reconstruct(&obs, Convention::DailyDelta).at(ID, Stage::Reconstruct)?;
            debug!(%kind, entries = entries.len(), "series");
            fragments.push(Fragment::Series(kind, entries));
        }
        Ok(fragments)
    }

    async fn totals<F: Fetch>(
        &self,
        fetcher: &F,
        dimension: Dimension,
    ) -> Result<CategoryTotal, SourceError> {
        let (url, query) = self.totals_query(dimension);
        let rows = self.rows(fetcher, url, &query).await?;
        let pairs = rows
            .iter()
            .map(|r| Ok((r.label("label")?, parse_count(&r.text("count")?)?)))
            .collect::<Result<Vec<_>, Error>>()
            .at(ID, Stage::Extract)?;
        map_totals(dimension, &pairs, &self.vocab).at(ID, Stage::Map)
    }

    #[instrument(level = "info", skip_all, fields(source = %ID))]
    pub async fn scrape<F: Fetch>(&self, fetcher: &F) -> Result<CountyRecord, SourceError> {
        let body = fetcher
            .get_text(&self.config.metadata_url, &[])
            .await
            .at(ID, Stage::Fetch)?;
        let meta: ViewMetadata = serde_json::from_str(&body)
            .map_err(|e| Error::layout(format!("view metadata: {e}")))
            .at(ID, Stage::Extract)?;
        let update_time = meta
            .data_updated_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .at(ID, Stage::Extract)?;

        let mut fragments = Vec::new();
        for kind in [SeriesKind::Cases, SeriesKind::Deaths] {
            fragments.push(Fragment::Series(kind, self.series(fetcher, kind).await?));
        }
        fragments.extend(self.test_series(fetcher).await?);
        for &dimension in COVERAGE.case_totals {
            fragments.push(Fragment::CaseTotals(
                dimension,
                self.totals(fetcher, dimension).await?,
            ));
        }
        info!(fragments = fragments.len(), "fetched datasets");

        let header = Header::new(&self.config.common, update_time, meta.description);
        assemble(header, &COVERAGE, fragments).at(ID, Stage::Assemble)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::fetch::StaticFetcher;

    fn sf() -> SanFrancisco {
        let config = Config::embedded().unwrap();
        SanFrancisco::new(config.sources.san_francisco.clone().unwrap()).unwrap()
    }

    /// Canned responses for every dataset; `gender` lets tests inject drift.
    fn fixtures(sf: &SanFrancisco, gender: &str) -> StaticFetcher {
        let mut f = StaticFetcher::new().with_body(
            &sf.config.metadata_url,
            &[],
            r#"{"dataUpdatedAt":"2020-05-29T15:30:25+0000","description":"Confirmed cases by date and transmission."}"#,
        );
        let series = [
            (
                SeriesKind::Cases,
                r#"[{"date":"2020-03-04T00:00:00.000","count":"1"},
                    {"date":"2020-03-05T00:00:00.000","count":"3"},
                    {"date":"2020-03-07T00:00:00.000","count":"2"}]"#,
            ),
            (
                SeriesKind::Deaths,
                r#"[{"date":"2020-03-22T00:00:00.000","count":"1"}]"#,
            ),
            (
                SeriesKind::Tests,
                r#"[{"date":"2020-03-01T00:00:00.000","tests":"120","pos":"6"},
                    {"date":"2020-03-02T00:00:00.000","tests":"80","pos":"10"}]"#,
            ),
        ];
        for (kind, body) in series {
            let (url, q) = sf.series_query(kind);
            f = f.with_body(url, &q, body);
        }
        let totals = [
            (Dimension::Gender, gender.to_string()),
            (
                Dimension::AgeGroup,
                r#"[{"label":"under 18","count":"4"},{"label":"18-30","count":"9"},{"count":"1"}]"#
                    .to_string(),
            ),
            (
                Dimension::RaceEth,
                r#"[{"label":"Asian","count":"5"},{"label":"Hispanic or Latino/a, all races","count":"7"},{"label":"Unknown","count":"2"}]"#
                    .to_string(),
            ),
            (
                Dimension::TransmissionCat,
                r#"[{"label":"Community","count":"10"},{"label":"From Contact","count":"4"}]"#
                    .to_string(),
            ),
        ];
        for (dim, body) in totals {
            let (url, q) = sf.totals_query(dim);
            f = f.with_body(url, &q, body);
        }
        f
    }

    const GENDER: &str =
        r#"[{"label":"Male","count":"8"},{"label":"Female","count":"6"},{"label":"Trans Female","count":"0"}]"#;

    #[tokio::test]
    async fn scrapes_all_datasets() {
        let sf = sf();
        let rec = sf.scrape(&fixtures(&sf, GENDER)).await.unwrap();

        assert_eq!(rec.name, "San Francisco County");
        assert_eq!(rec.update_time.to_string(), "2020-05-29 15:30:25");
        assert_eq!(rec.meta_from_source, "Confirmed cases by date and transmission.");

        let cumul: Vec<i64> = rec.series.cases.iter().map(|e| e.cumulative).collect();
        assert_eq!(cumul, vec![1, 4, 6]);
        assert_eq!(rec.series.deaths.len(), 1);
        assert_eq!(rec.series.tests.last().unwrap().cumulative, 200);
        let pos: Vec<(i64, i64)> = rec
            .series
            .positive_tests
            .iter()
            .map(|e| (e.count, e.cumulative))
            .collect();
        assert_eq!(pos, vec![(6, 6), (10, 16)]);
        let neg: Vec<(i64, i64)> = rec
            .series
            .negative_tests
            .iter()
            .map(|e| (e.count, e.cumulative))
            .collect();
        assert_eq!(neg, vec![(114, 114), (70, 184)]);
        assert!(rec.tests_totals.is_none());

        let age = rec.case_totals.age_group.as_ref().unwrap();
        assert_eq!(age.get("0_to_17"), Some(4));
        // a null group is the empty label, listed as Unknown in the vocabulary
        assert_eq!(age.get("Unknown"), Some(1));
        assert_eq!(
            rec.case_totals.gender.as_ref().unwrap().get("trans_female"),
            Some(0)
        );
        assert_eq!(
            rec.case_totals.race_eth.as_ref().unwrap().get("Latinx_or_Hispanic"),
            Some(7)
        );

        // no death breakdowns upstream: reported as null, not zero
        let v = serde_json::to_value(&rec).unwrap();
        for d in Dimension::DEMOGRAPHIC {
            assert!(v["death_totals"][d.as_str()].is_null());
        }
    }

    #[tokio::test]
    async fn renamed_gender_is_drift() {
        let sf = sf();
        let fetcher = fixtures(&sf, r#"[{"label":"Men","count":"8"}]"#);
        let err = sf.scrape(&fetcher).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatDrift);
        assert_eq!(err.stage, Stage::Map);
        assert!(err.to_string().contains("\"Men\""));
    }

    #[tokio::test]
    async fn missing_timestamp_is_missing_metadata() {
        let sf = sf();
        let fetcher = fixtures(&sf, GENDER).with_body(
            &sf.config.metadata_url,
            &[],
            r#"{"description":"no timestamp here"}"#,
        );
        let err = sf.scrape(&fetcher).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    }

    #[tokio::test]
    async fn unordered_series_is_ordering_error() {
        let sf = sf();
        let (url, q) = sf.series_query(SeriesKind::Deaths);
        let fetcher = fixtures(&sf, GENDER).with_body(
            url,
            &q,
            r#"[{"date":"2020-03-22T00:00:00.000","count":"1"},{"date":"2020-03-22T00:00:00.000","count":"2"}]"#,
        );
        let err = sf.scrape(&fetcher).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ordering);
        assert_eq!(err.stage, Stage::Reconstruct);
    }

    #[tokio::test]
    async fn bad_count_is_parse_error() {
        let sf = sf();
        let (url, q) = sf.series_query(SeriesKind::Tests);
        let fetcher = fixtures(&sf, GENDER).with_body(
            url,
            &q,
            r#"[{"date":"2020-03-01T00:00:00.000","tests":"n/a","pos":"1"}]"#,
        );
        let err = sf.scrape(&fetcher).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.stage, Stage::Extract);
    }

    #[tokio::test]
    async fn more_positives_than_tests_is_drift() {
        let sf = sf();
        let (url, q) = sf.series_query(SeriesKind::Tests);
        let fetcher = fixtures(&sf, GENDER).with_body(
            url,
            &q,
            r#"[{"date":"2020-03-01T00:00:00.000","tests":"5","pos":"7"}]"#,
        );
        let err = sf.scrape(&fetcher).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatDrift);
        assert_eq!(err.stage, Stage::Extract);
        assert!(err.to_string().contains("7 positive of 5 tests on 2020-03-01"));
    }
}
