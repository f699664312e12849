// src/runner.rs
//! Drive selected adapters concurrently and collect records. One county
//! failing never affects another.

use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, warn};

use crate::error::{Error, SourceError};
use crate::fetch::Fetch;
use crate::model::{CountyRecord, SeriesKind};
use crate::series::negative_deltas;
use crate::sources::{Registry, SourceId};

/// A day whose reconstructed count went below zero (an upstream revision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegativeDelta {
    pub source: SourceId,
    pub series: SeriesKind,
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub records: BTreeMap<SourceId, CountyRecord>,
    pub failures: Vec<SourceError>,
    pub negative_deltas: Vec<NegativeDelta>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

fn flag_revisions(source: SourceId, record: &CountyRecord) -> Vec<NegativeDelta> {
    SeriesKind::ALL
        .into_iter()
        .flat_map(|series| {
            negative_deltas(record.series.get(series))
                .into_iter()
                .map(move |e| NegativeDelta {
                    source,
                    series,
                    date: e.date,
                    count: e.count,
                })
        })
        .collect()
}

/// Scrape `ids` (all registered sources when empty), each county once.
/// Asking for a county that is not registered is a config error before
/// anything is fetched.
pub async fn run<F: Fetch>(
    registry: &Registry,
    ids: &[SourceId],
    fetcher: &F,
) -> Result<RunReport, Error> {
    let ids: BTreeSet<SourceId> = if ids.is_empty() {
        registry.ids().collect()
    } else {
        ids.iter().copied().collect()
    };
    let mut sources = Vec::with_capacity(ids.len());
    for id in ids {
        let source = registry
            .get(id)
            .ok_or_else(|| Error::Config(format!("county {id} is not configured")))?;
        sources.push(source);
    }
    info!(sources = sources.len(), "scraping");

    let results = join_all(sources.iter().map(|s| async move {
        (s.id(), s.scrape(fetcher).await)
    }))
    .await;

    let mut report = RunReport::default();
    for (id, result) in results {
        match result {
            Ok(record) => {
                for nd in flag_revisions(id, &record) {
                    warn!(source = %nd.source, series = %nd.series, date = %nd.date, count = nd.count, "negative daily count");
                    report.negative_deltas.push(nd);
                }
                info!(source = %id, update_time = %record.update_time, "scraped");
                report.records.insert(id, record);
            }
            Err(e) => {
                error!(source = %id, stage = %e.stage, "{e}");
                report.failures.push(e);
            }
        }
    }
    Ok(report)
}
