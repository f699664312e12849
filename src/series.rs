// src/series.rs
//! Turn an upstream's time series into entries carrying both the daily delta
//! and the running total, whichever of the two the upstream publishes.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::Error;
use crate::model::DailyEntry;

/// How an upstream reports a series. Fixed per source, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    DailyDelta,
    RunningTotal,
}

/// One raw numeric observation, in the upstream's own convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: u64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: u64) -> Self {
        Self { date, value }
    }
}

fn signed(value: u64) -> Result<i64, Error> {
    i64::try_from(value).map_err(|_| Error::parse("count", value.to_string()))
}

/// Build canonical entries from date-ordered observations.
///
/// Dates must be strictly increasing. Negative deltas from a running total
/// that went down are kept as-is; see [`negative_deltas`].
pub fn reconstruct(
    observations: &[Observation],
    convention: Convention,
) -> Result<Vec<DailyEntry>, Error> {
    let mut out = Vec::with_capacity(observations.len());
    let mut acc: i64 = 0;
    let mut prev: Option<NaiveDate> = None;

    for obs in observations {
        if let Some(previous) = prev {
            if obs.date <= previous {
                return Err(Error::Ordering {
                    previous,
                    current: obs.date,
                });
            }
        }
        prev = Some(obs.date);

        let value = signed(obs.value)?;
        let (count, cumulative) = match convention {
            Convention::DailyDelta => {
                acc = acc
                    .checked_add(value)
                    .ok_or_else(|| Error::parse("cumulative count", obs.value.to_string()))?;
                (value, acc)
            }
            Convention::RunningTotal => {
                let delta = value - acc;
                acc = value;
                (delta, value)
            }
        };
        out.push(DailyEntry {
            date: obs.date,
            count,
            cumulative,
        });
    }
    Ok(out)
}

/// Running totals implied by the entries' daily deltas.
pub fn running_totals(entries: &[DailyEntry]) -> Vec<i64> {
    entries
        .iter()
        .scan(0i64, |acc, e| {
            *acc += e.count;
            Some(*acc)
        })
        .collect()
}

/// Entries whose delta is negative: the upstream revised a total downward.
pub fn negative_deltas(entries: &[DailyEntry]) -> Vec<&DailyEntry> {
    entries.iter().filter(|e| e.count < 0).collect()
}
