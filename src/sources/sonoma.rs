// src/sources/sonoma.rs
//! Sonoma County: an HTML dashboard with one table per heading.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use super::table::{self, SeriesTable, TotalsTable};
use super::{Coverage, SourceCommon, SourceId};
use crate::assemble::{assemble, Fragment, Header};
use crate::error::{Drift, Error, SourceError, Stage, StageExt};
use crate::extract::{locate, rows, Document, TableHandle};
use crate::fetch::Fetch;
use crate::model::{CountyRecord, SeriesKind};
use crate::parse::{parse_count, parse_timestamp};
use crate::series::reconstruct;
use crate::vocab::{Dimension, Vocabulary};

const ID: SourceId = SourceId::Sonoma;

/// Sonoma publishes test counts by result but no tests series, and no
/// death breakdowns.
pub const COVERAGE: Coverage = Coverage {
    series: &[SeriesKind::Cases, SeriesKind::Deaths],
    case_totals: &Dimension::DEMOGRAPHIC,
    death_totals: &[],
    tests_totals: true,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadingRef {
    pub tag: String,
    pub text: String,
}

/// A count printed in a footnote beside a table rather than as a row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NoteRule {
    pub css: String,
    /// First capture group is the count.
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SonomaConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    pub page_url: String,
    pub update_marker: String,
    pub definitions: HeadingRef,
    pub cases_by_date: SeriesTable,
    pub totals: BTreeMap<Dimension, TotalsTable>,
    /// The "Test Results" table.
    pub tests_totals: TotalsTable,
    pub unknown_race_note: Option<NoteRule>,
}

#[derive(Debug)]
pub struct Sonoma {
    config: SonomaConfig,
    vocab: Vocabulary,
    unknown_race: Option<Regex>,
}

impl Sonoma {
    pub fn new(config: SonomaConfig) -> Result<Self, Error> {
        let vocab = config
            .common
            .vocabulary(&COVERAGE, &[config.page_url.as_str()])?;

        config.cases_by_date.validate()?;
        if let Some(kind) = COVERAGE
            .series
            .iter()
            .find(|k| !config.cases_by_date.columns.contains_key(*k))
        {
            return Err(Error::Config(format!("sonoma: no column for series {kind}")));
        }
        for d in COVERAGE.case_totals {
            config
                .totals
                .get(d)
                .ok_or_else(|| Error::Config(format!("sonoma: no table for {d}")))?
                .validate()?;
        }
        config.tests_totals.validate()?;

        let unknown_race = config
            .unknown_race_note
            .as_ref()
            .map(|n| {
                Regex::new(&n.pattern)
                    .map_err(|e| Error::Config(format!("sonoma: bad note pattern: {e}")))
            })
            .transpose()?;

        Ok(Self {
            config,
            vocab,
            unknown_race,
        })
    }

    pub fn config(&self) -> &SonomaConfig {
        &self.config
    }

    #[instrument(level = "info", skip_all, fields(source = %ID))]
    pub async fn scrape<F: Fetch>(&self, fetcher: &F) -> Result<CountyRecord, SourceError> {
        let body = fetcher
            .get_text(&self.config.page_url, &[])
            .await
            .at(ID, Stage::Fetch)?;
        info!(bytes = body.len(), "fetched dashboard");
        self.transform(&body)
    }

    /// Everything after the fetch; the parsed page never leaves this call.
    pub fn transform(&self, body: &str) -> Result<CountyRecord, SourceError> {
        let doc = Document::parse(body);
        let mut fragments = Vec::new();

        let by_date = &self.config.cases_by_date;
        let handle = locate(&doc, &by_date.locator).at(ID, Stage::Locate)?;
        let observed = table::observations(&rows(&handle, true), by_date).at(ID, Stage::Extract)?;
        for (kind, (convention, obs)) in observed {
            if !COVERAGE.series.contains(&kind) {
                continue;
            }
            let entries = reconstruct(&obs, convention).at(ID, Stage::Reconstruct)?;
            debug!(%kind, entries = entries.len(), "series");
            fragments.push(Fragment::Series(kind, entries));
        }

        for &dimension in COVERAGE.case_totals {
            let layout = self
                .config
                .totals
                .get(&dimension)
                .ok_or_else(|| Error::Config(format!("no table for {dimension}")))
                .at(ID, Stage::Locate)?;
            let handle = locate(&doc, &layout.locator).at(ID, Stage::Locate)?;
            let pairs = table::labelled_counts(&rows(&handle, true), layout).at(ID, Stage::Extract)?;
            let mut totals = table::map_totals(dimension, &pairs, &self.vocab).at(ID, Stage::Map)?;

            if dimension == Dimension::RaceEth {
                if let Some(n) = self.unknown_race(&handle)? {
                    let unknown = Dimension::RaceEth
                        .canonical("Unknown")
                        .ok_or_else(|| Error::Config("race_eth has no Unknown label".into()))
                        .at(ID, Stage::Map)?;
                    totals.add(unknown, n).at(ID, Stage::Map)?;
                }
            }
            fragments.push(Fragment::CaseTotals(dimension, totals));
        }

        let layout = &self.config.tests_totals;
        let handle = locate(&doc, &layout.locator).at(ID, Stage::Locate)?;
        let pairs = table::labelled_counts(&rows(&handle, true), layout).at(ID, Stage::Extract)?;
        let results = table::map_totals(Dimension::TestResult, &pairs, &self.vocab).at(ID, Stage::Map)?;
        fragments.push(Fragment::TestsTotals(results));

        let update_time = doc
            .first_text(&self.config.update_marker)
            .at(ID, Stage::Locate)?
            .map(|t| parse_timestamp(&t))
            .transpose()
            .at(ID, Stage::Extract)?;
        let meta = self.definitions(&doc).at(ID, Stage::Locate)?;

        let header = Header::new(&self.config.common, update_time, meta);
        assemble(header, &COVERAGE, fragments).at(ID, Stage::Assemble)
    }

    fn definitions(&self, doc: &Document) -> Result<String, Error> {
        let h = &self.config.definitions;
        Ok(doc.section_lines(&h.tag, &h.text)?.join("/"))
    }

    /// The "N (P%) missing race/ethnicity" footnote. If a rule is configured
    /// the note must be present and phrased as expected.
    fn unknown_race(&self, handle: &TableHandle<'_>) -> Result<Option<u64>, SourceError> {
        let (Some(rule), Some(re)) = (&self.config.unknown_race_note, &self.unknown_race) else {
            return Ok(None);
        };
        let note = handle.note_text(&rule.css).at(ID, Stage::Locate)?;
        let n = re
            .captures(&note)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                Error::FormatDrift(Drift::Layout(format!(
                    "unknown-race note changed: {note:?}"
                )))
            })
            .at(ID, Stage::Map)?;
        parse_count(n.as_str()).map(Some).at(ID, Stage::Extract)
    }
}
