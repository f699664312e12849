// src/vocab.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::trace;

use crate::error::Error;

/// A breakdown dimension: the four demographic ones plus test results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Gender,
    AgeGroup,
    RaceEth,
    TransmissionCat,
    TestResult,
}

const GENDER: &[&str] = &["male", "female", "trans_female", "trans_male", "other", "unknown"];

const AGE_GROUP: &[&str] = &[
    "0_to_17",
    "18_to_30",
    "31_to_40",
    "41_to_50",
    "51_to_60",
    "61_to_70",
    "71_to_80",
    "81_and_older",
    "18_to_49",
    "50_to_64",
    "65_and_older",
    "Unknown",
];

const RACE_ETH: &[&str] = &[
    "African_Amer",
    "Asian",
    "Latinx_or_Hispanic",
    "Native_Amer",
    "Multiple_Race",
    "Other",
    "Pacific_Islander",
    "White",
    "Unknown",
];

const TRANSMISSION_CAT: &[&str] = &["community", "from_contact", "travel", "unknown"];

const TEST_RESULT: &[&str] = &["positive", "negative", "pending", "inconclusive", "unknown"];

impl Dimension {
    /// The dimensions of `case_totals` / `death_totals`.
    pub const DEMOGRAPHIC: [Dimension; 4] = [
        Dimension::Gender,
        Dimension::AgeGroup,
        Dimension::RaceEth,
        Dimension::TransmissionCat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Gender => "gender",
            Dimension::AgeGroup => "age_group",
            Dimension::RaceEth => "race_eth",
            Dimension::TransmissionCat => "transmission_cat",
            Dimension::TestResult => "test_result",
        }
    }

    /// The fixed output vocabulary for this dimension.
    pub fn canonical_labels(&self) -> &'static [&'static str] {
        match self {
            Dimension::Gender => GENDER,
            Dimension::AgeGroup => AGE_GROUP,
            Dimension::RaceEth => RACE_ETH,
            Dimension::TransmissionCat => TRANSMISSION_CAT,
            Dimension::TestResult => TEST_RESULT,
        }
    }

    /// Look up a canonical label by name.
    pub fn canonical(&self, name: &str) -> Option<Canonical> {
        self.canonical_labels()
            .iter()
            .find(|l| **l == name)
            .map(|l| Canonical {
                dimension: *self,
                label: l,
            })
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label known to belong to its dimension's canonical enumeration.
/// Only obtainable through [`Dimension::canonical`] or [`Vocabulary::map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Canonical {
    dimension: Dimension,
    label: &'static str,
}

impl Canonical {
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn as_str(&self) -> &'static str {
        self.label
    }
}

/// Config shape: dimension → canonical label → recognized upstream spellings.
pub type Spellings = BTreeMap<Dimension, BTreeMap<String, Vec<String>>>;

/// One source's label mapping, validated against the canonical enumerations.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    maps: HashMap<Dimension, HashMap<String, Canonical>>,
}

impl Vocabulary {
    pub fn from_spellings(spellings: &Spellings) -> Result<Self, Error> {
        let mut maps = HashMap::new();
        for (&dimension, by_canonical) in spellings {
            let mut map: HashMap<String, Canonical> = HashMap::new();
            for (name, upstream) in by_canonical {
                let canonical = dimension.canonical(name).ok_or_else(|| {
                    Error::Config(format!("{name:?} is not a canonical {dimension} label"))
                })?;
                for spelling in upstream {
                    if let Some(prev) = map.insert(spelling.clone(), canonical) {
                        if prev != canonical {
                            return Err(Error::Config(format!(
                                "{dimension} spelling {spelling:?} maps to both {} and {}",
                                prev.as_str(),
                                canonical.as_str()
                            )));
                        }
                    }
                }
            }
            maps.insert(dimension, map);
        }
        Ok(Self { maps })
    }

    /// Map an upstream label to its canonical label. Labels are compared
    /// exactly after trimming; anything unseen is format drift.
    pub fn map(&self, dimension: Dimension, upstream: &str) -> Result<Canonical, Error> {
        let label = upstream.trim();
        let canonical = self
            .maps
            .get(&dimension)
            .and_then(|m| m.get(label))
            .copied()
            .ok_or_else(|| Error::unknown_label(dimension, label))?;
        trace!(%dimension, upstream = label, canonical = canonical.as_str(), "mapped");
        Ok(canonical)
    }

    pub fn covers(&self, dimension: Dimension) -> bool {
        self.maps.contains_key(&dimension)
    }
}
