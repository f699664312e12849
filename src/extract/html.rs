// src/extract/html.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::fmt;
use tracing::trace;

use super::{normalize_ws, Row};
use crate::error::Error;

static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("selector should parse"));
static CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("selector should parse"));
static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("selector should parse"));

fn selector(css: &str) -> Result<Selector, Error> {
    Selector::parse(css).map_err(|e| Error::Config(format!("invalid selector {css:?}: {e:?}")))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn parent_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.parent().and_then(ElementRef::wrap)
}

/// A parsed HTML page. Lives only as long as one adapter call.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// Normalized text of the first element matching `css`.
    pub fn first_text(&self, css: &str) -> Result<Option<String>, Error> {
        let sel = selector(css)?;
        Ok(self
            .html
            .select(&sel)
            .next()
            .map(|el| normalize_ws(&text_of(el))))
    }

    /// All `tag` elements whose text contains `needle`, in document order.
    pub fn find_by_text(&self, tag: &str, needle: &str) -> Result<Vec<ElementRef<'_>>, Error> {
        let sel = selector(tag)?;
        Ok(self
            .html
            .select(&sel)
            .filter(|el| text_of(*el).contains(needle))
            .collect())
    }

    /// Non-blank lines of the section a heading sits in, heading included.
    pub fn section_lines(&self, tag: &str, heading: &str) -> Result<Vec<String>, Error> {
        let h = self.unique_heading(tag, heading)?;
        let section = parent_element(h)
            .ok_or_else(|| Error::NotFound(format!("<{tag}> {heading:?} has no parent")))?;
        Ok(text_of(section)
            .lines()
            .map(normalize_ws)
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn unique_heading(&self, tag: &str, text: &str) -> Result<ElementRef<'_>, Error> {
        let found = self.find_by_text(tag, text)?;
        match found.as_slice() {
            [] => Err(Error::NotFound(format!(
                "no <{tag}> heading containing {text:?}"
            ))),
            [h] => Ok(*h),
            _ => Err(Error::NotFound(format!(
                "{} <{tag}> headings contain {text:?}",
                found.len()
            ))),
        }
    }
}

/// Which match to take when a locator finds several tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    /// Exactly one match, anything else is an error.
    #[default]
    Only,
    First,
    Last,
}

/// How to find one logical table in a page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    /// Tables inside the parent of the unique `tag` heading containing `text`.
    Heading {
        tag: String,
        text: String,
        #[serde(default)]
        pick: Pick,
    },
    /// Tables matching a CSS selector anywhere in the page.
    Selector {
        css: String,
        #[serde(default)]
        pick: Pick,
    },
}

impl Locator {
    pub fn heading(tag: &str, text: &str, pick: Pick) -> Self {
        Locator::Heading {
            tag: tag.to_string(),
            text: text.to_string(),
            pick,
        }
    }

    fn pick(&self) -> Pick {
        match self {
            Locator::Heading { pick, .. } | Locator::Selector { pick, .. } => *pick,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Heading { tag, text, pick } => {
                write!(f, "table under <{tag}> {text:?} ({pick:?})")
            }
            Locator::Selector { css, pick } => write!(f, "table {css:?} ({pick:?})"),
        }
    }
}

/// A located table; borrows the [`Document`] it came from.
#[derive(Clone)]
pub struct TableHandle<'a> {
    element: ElementRef<'a>,
    locator: Locator,
}

impl fmt::Debug for TableHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("locator", &self.locator)
            .finish()
    }
}

impl<'a> TableHandle<'a> {
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Normalized text of the first `css` element beside the table, i.e.
    /// inside the table's parent. Footnotes live there.
    pub fn note_text(&self, css: &str) -> Result<String, Error> {
        let sel = selector(css)?;
        parent_element(self.element)
            .and_then(|p| p.select(&sel).next())
            .map(|el| normalize_ws(&text_of(el)))
            .ok_or_else(|| Error::NotFound(format!("no {css:?} note beside {}", self.locator)))
    }
}

pub fn locate<'a>(doc: &'a Document, locator: &Locator) -> Result<TableHandle<'a>, Error> {
    let tables: Vec<ElementRef<'a>> = match locator {
        Locator::Heading { tag, text, .. } => {
            let heading = doc.unique_heading(tag, text)?;
            let section = parent_element(heading)
                .ok_or_else(|| Error::NotFound(format!("<{tag}> {text:?} has no parent")))?;
            section.select(&TABLE).collect()
        }
        Locator::Selector { css, .. } => {
            let sel = selector(css)?;
            doc.html.select(&sel).collect()
        }
    };

    let n = tables.len();
    let chosen = match locator.pick() {
        Pick::Only if n > 1 => {
            return Err(Error::NotFound(format!(
                "{locator} is ambiguous: {n} tables match"
            )))
        }
        Pick::Only | Pick::First => tables.into_iter().next(),
        Pick::Last => tables.into_iter().last(),
    };
    let element = chosen.ok_or_else(|| Error::NotFound(format!("no {locator}")))?;
    trace!(%locator, candidates = n, "located table");

    Ok(TableHandle {
        element,
        locator: locator.clone(),
    })
}

/// Rows of a table in document order, optionally without the header row.
pub fn rows(handle: &TableHandle<'_>, skip_header: bool) -> Vec<Row> {
    handle
        .element
        .select(&TR)
        .skip(usize::from(skip_header))
        .map(cells)
        .collect()
}

pub fn cells(row: ElementRef<'_>) -> Row {
    row.select(&CELL)
        .map(|c| normalize_ws(&text_of(c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PAGE: &str = r#"
<html><body>
  <time class="updated">May 6, 2020 10:00 AM</time>
  <div>
    <h3>Cases by Date</h3>
    <table><tr><th>Summary</th></tr><tr><td>ignored</td></tr></table>
    <table>
      <tr><th>Date</th><th>New</th></tr>
      <tr><td>May 2, 2020</td><td>1,204</td></tr>
      <tr><td> May 1, 2020 </td><td>-</td></tr>
    </table>
    <p>12 (3%) missing race/ethnicity</p>
  </div>
  <div><h3>Definitions</h3>
    <p>Active: currently sick</p>
    <p>Recovered:   no longer sick</p>
  </div>
</body></html>"#;

    #[test]
    fn heading_locator_takes_last_table_when_asked() {
        let doc = Document::parse(PAGE);
        let table = locate(&doc, &Locator::heading("h3", "Cases by Date", Pick::Last)).unwrap();
        let rows = rows(&table, true);
        assert_eq!(
            rows,
            vec![
                vec!["May 2, 2020".to_string(), "1,204".to_string()],
                vec!["May 1, 2020".to_string(), "-".to_string()],
            ]
        );
    }

    #[test]
    fn ambiguity_is_an_error_unless_policy_given() {
        let doc = Document::parse(PAGE);
        let err = locate(&doc, &Locator::heading("h3", "Cases by Date", Pick::Only)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn missing_heading_is_not_found() {
        let doc = Document::parse(PAGE);
        let err = locate(&doc, &Locator::heading("h3", "Cases by Planet", Pick::Last)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn header_row_kept_when_requested() {
        let doc = Document::parse(PAGE);
        let table = locate(&doc, &Locator::heading("h3", "Cases by Date", Pick::First)).unwrap();
        assert_eq!(rows(&table, false)[0], vec!["Summary".to_string()]);
    }

    #[test]
    fn selector_locator_and_notes() {
        let doc = Document::parse(PAGE);
        let loc = Locator::Selector {
            css: "table".into(),
            pick: Pick::Last,
        };
        let table = locate(&doc, &loc).unwrap();
        assert_eq!(
            table.note_text("p").unwrap(),
            "12 (3%) missing race/ethnicity"
        );
        assert_eq!(
            doc.first_text("time.updated").unwrap().as_deref(),
            Some("May 6, 2020 10:00 AM")
        );
        assert_eq!(doc.first_text("time.created").unwrap(), None);
    }

    #[test]
    fn section_lines_are_normalized() {
        let doc = Document::parse(PAGE);
        let lines = doc.section_lines("h3", "Definitions").unwrap();
        assert_eq!(
            lines,
            vec!["Definitions", "Active: currently sick", "Recovered: no longer sick"]
        );
    }
}
