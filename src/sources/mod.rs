// src/sources/mod.rs
//! One adapter per upstream, all behind the same contract:
//! fetch → fragments → [`CountyRecord`].

pub mod san_francisco;
pub mod sonoma;
pub mod table;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::config::Config;
use crate::error::{Error, SourceError};
use crate::fetch::Fetch;
use crate::model::{CountyRecord, SeriesKind};
use crate::vocab::{Dimension, Spellings, Vocabulary};

pub use san_francisco::SanFrancisco;
pub use sonoma::Sonoma;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    SanFrancisco,
    Sonoma,
}

impl SourceId {
    pub const ALL: [SourceId; 2] = [SourceId::SanFrancisco, SourceId::Sonoma];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::SanFrancisco => "san_francisco",
            SourceId::Sonoma => "sonoma",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = SourceId::ALL.iter().map(|id| id.as_str()).collect();
                Error::Config(format!(
                    "unknown county {s:?}; supported: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Config fields every source carries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceCommon {
    pub name: String,
    pub source_url: String,
    #[serde(default)]
    pub meta_from_baypd: String,
    #[serde(default)]
    pub vocab: Spellings,
}

impl SourceCommon {
    /// Check URLs and build the vocabulary, which must cover every
    /// dimension the adapter reports.
    pub fn vocabulary(&self, coverage: &Coverage, urls: &[&str]) -> Result<Vocabulary, Error> {
        for u in std::iter::once(self.source_url.as_str()).chain(urls.iter().copied()) {
            Url::parse(u).map_err(|e| Error::Config(format!("{}: bad URL {u:?}: {e}", self.name)))?;
        }
        let vocab = Vocabulary::from_spellings(&self.vocab)?;
        if let Some(d) = coverage.dimensions().find(|d| !vocab.covers(*d)) {
            return Err(Error::Config(format!("{}: no {d} vocabulary", self.name)));
        }
        Ok(vocab)
    }
}

/// What an adapter populates. Anything not listed is "not reported":
/// an empty series or a `null` totals table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub series: &'static [SeriesKind],
    pub case_totals: &'static [Dimension],
    pub death_totals: &'static [Dimension],
    pub tests_totals: bool,
}

impl Coverage {
    /// Every dimension that needs a vocabulary.
    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.case_totals
            .iter()
            .chain(self.death_totals.iter())
            .copied()
            .chain(self.tests_totals.then_some(Dimension::TestResult))
    }
}

/// The fixed set of adapter variants.
#[derive(Debug)]
pub enum Source {
    SanFrancisco(SanFrancisco),
    Sonoma(Sonoma),
}

impl Source {
    pub fn id(&self) -> SourceId {
        match self {
            Source::SanFrancisco(_) => SourceId::SanFrancisco,
            Source::Sonoma(_) => SourceId::Sonoma,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Source::SanFrancisco(s) => &s.config().common.name,
            Source::Sonoma(s) => &s.config().common.name,
        }
    }

    pub fn coverage(&self) -> &'static Coverage {
        match self {
            Source::SanFrancisco(_) => &san_francisco::COVERAGE,
            Source::Sonoma(_) => &sonoma::COVERAGE,
        }
    }

    pub async fn scrape<F: Fetch>(&self, fetcher: &F) -> Result<CountyRecord, SourceError> {
        match self {
            Source::SanFrancisco(s) => s.scrape(fetcher).await,
            Source::Sonoma(s) => s.scrape(fetcher).await,
        }
    }
}

/// Source id → adapter, resolved once from config.
#[derive(Debug, Default)]
pub struct Registry {
    sources: BTreeMap<SourceId, Source>,
}

impl Registry {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut sources = BTreeMap::new();
        if let Some(c) = &config.sources.san_francisco {
            sources.insert(
                SourceId::SanFrancisco,
                Source::SanFrancisco(SanFrancisco::new(c.clone())?),
            );
        }
        if let Some(c) = &config.sources.sonoma {
            sources.insert(SourceId::Sonoma, Source::Sonoma(Sonoma::new(c.clone())?));
        }
        Ok(Self { sources })
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
