// src/extract/mod.rs
//! Structural extraction: locate a logical table in a fetched document and
//! hand back its rows as plain text. Nothing here knows what a cell means.

pub mod html;
pub mod json;

pub use html::{cells, locate, rows, Document, Locator, Pick, TableHandle};
pub use json::{json_rows, JsonRow};

/// Ordered cell text for one table row.
pub type Row = Vec<String>;

/// Collapse runs of whitespace (including `&nbsp;`) into single spaces.
pub fn normalize_ws(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
