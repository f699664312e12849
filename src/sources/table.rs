// src/sources/table.rs
//! Positional interpretation of extracted HTML rows, shared by dashboard
//! adapters. Each step maps to one pipeline stage so callers can tag errors.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Error;
use crate::extract::{Locator, Row};
use crate::model::{CategoryTotal, SeriesKind};
use crate::parse::{parse_count, parse_date};
use crate::series::{Convention, Observation};
use crate::vocab::{Dimension, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    OldestFirst,
    NewestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SeriesColumn {
    pub index: usize,
    pub convention: Convention,
}

/// A by-date table: one date column plus one column per series.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeriesTable {
    pub locator: Locator,
    pub row_order: RowOrder,
    pub width: usize,
    pub date_column: usize,
    pub columns: BTreeMap<SeriesKind, SeriesColumn>,
}

/// A label/count table such as "Cases by Gender".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TotalsTable {
    pub locator: Locator,
    pub width: usize,
    pub label_column: usize,
    pub count_column: usize,
}

impl SeriesTable {
    pub fn validate(&self) -> Result<(), Error> {
        let cols = std::iter::once(self.date_column).chain(self.columns.values().map(|c| c.index));
        check_columns(&self.locator, self.width, cols)
    }
}

impl TotalsTable {
    pub fn validate(&self) -> Result<(), Error> {
        check_columns(
            &self.locator,
            self.width,
            [self.label_column, self.count_column].into_iter(),
        )
    }
}

fn check_columns(
    locator: &Locator,
    width: usize,
    mut cols: impl Iterator<Item = usize>,
) -> Result<(), Error> {
    match cols.find(|&c| c >= width) {
        Some(c) => Err(Error::Config(format!(
            "{locator}: column {c} outside a {width}-cell row"
        ))),
        None => Ok(()),
    }
}

fn check_shape(rows: &[Row], width: usize, locator: &Locator) -> Result<(), Error> {
    if rows.is_empty() {
        return Err(Error::layout(format!("{locator} has no data rows")));
    }
    if let Some(row) = rows.iter().find(|r| r.len() != width) {
        return Err(Error::layout(format!(
            "{locator}: expected {width} cells per row, got {} in {row:?}",
            row.len()
        )));
    }
    Ok(())
}

/// Per-series observations in ascending date order, tagged with the
/// column's convention.
pub fn observations(
    rows: &[Row],
    table: &SeriesTable,
) -> Result<BTreeMap<SeriesKind, (Convention, Vec<Observation>)>, Error> {
    check_shape(rows, table.width, &table.locator)?;

    let mut out: BTreeMap<SeriesKind, (Convention, Vec<Observation>)> = table
        .columns
        .iter()
        .map(|(kind, col)| (*kind, (col.convention, Vec::with_capacity(rows.len()))))
        .collect();

    for row in rows {
        let date = parse_date(&row[table.date_column])?;
        for (kind, col) in &table.columns {
            let value = parse_count(&row[col.index])?;
            if let Some((_, obs)) = out.get_mut(kind) {
                obs.push(Observation::new(date, value));
            }
        }
    }

    if table.row_order == RowOrder::NewestFirst {
        for (_, obs) in out.values_mut() {
            obs.reverse();
        }
    }
    debug!(rows = rows.len(), series = out.len(), "extracted observations");
    Ok(out)
}

/// `(upstream label, count)` pairs in table order.
pub fn labelled_counts(rows: &[Row], table: &TotalsTable) -> Result<Vec<(String, u64)>, Error> {
    check_shape(rows, table.width, &table.locator)?;
    rows.iter()
        .map(|row| {
            let count = parse_count(&row[table.count_column])?;
            Ok((row[table.label_column].clone(), count))
        })
        .collect()
}

/// Fold upstream labels into canonical buckets; any unknown label aborts.
pub fn map_totals(
    dimension: Dimension,
    pairs: &[(String, u64)],
    vocab: &Vocabulary,
) -> Result<CategoryTotal, Error> {
    let mut totals = CategoryTotal::new(dimension);
    for (label, count) in pairs {
        totals.add(vocab.map(dimension, label)?, *count)?;
    }
    Ok(totals)
}
