//! Experience values
//!
//! `Experience` is the consensus belief about one facility at one space.
//! `ReviewExperience` is what a single reviewer reported, and `ReportKind`
//! buckets those reports into the three inputs the consensus fold accepts.
//!
//! Neither type is ordered. Ranking weights live in `scoring`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consensus state for a (space, facility) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    /// No informative report yet
    #[default]
    Unknown,
    /// Usable per consensus
    Likely,
    /// Believed unusable, not confirmed impossible
    Unlikely,
    /// Conflicting reports
    Maybe,
    /// Confirmed unusable
    Impossible,
}

impl Experience {
    pub fn is_unknown(self) -> bool {
        matches!(self, Experience::Unknown)
    }

    pub fn is_likely(self) -> bool {
        matches!(self, Experience::Likely)
    }

    pub fn is_unlikely(self) -> bool {
        matches!(self, Experience::Unlikely)
    }

    pub fn is_maybe(self) -> bool {
        matches!(self, Experience::Maybe)
    }

    pub fn is_impossible(self) -> bool {
        matches!(self, Experience::Impossible)
    }

    /// Storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            Experience::Unknown => "unknown",
            Experience::Likely => "likely",
            Experience::Unlikely => "unlikely",
            Experience::Maybe => "maybe",
            Experience::Impossible => "impossible",
        }
    }
}

impl fmt::Display for Experience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Experience {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(Experience::Unknown),
            "likely" => Ok(Experience::Likely),
            "unlikely" => Ok(Experience::Unlikely),
            "maybe" => Ok(Experience::Maybe),
            "impossible" => Ok(Experience::Impossible),
            other => Err(Error::InvalidInput(format!("unknown experience '{}'", other))),
        }
    }
}

/// Input bucket for the consensus fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Facility usable, possibly with caveats
    Positive,
    /// Reporter was not allowed to use the facility
    Negative,
    /// Facility structurally cannot be used
    Impossible,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportKind::Positive => "positive",
            ReportKind::Negative => "negative",
            ReportKind::Impossible => "impossible",
        };
        f.write_str(s)
    }
}

/// What a reviewer reported about one facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewExperience {
    WasAllowed,
    WasAllowedButBad,
    WasNotAllowed,
    WasNotAvailable,
}

impl ReviewExperience {
    /// Bucket this report for the consensus fold
    pub fn kind(self) -> ReportKind {
        match self {
            ReviewExperience::WasAllowed | ReviewExperience::WasAllowedButBad => {
                ReportKind::Positive
            }
            ReviewExperience::WasNotAllowed => ReportKind::Negative,
            ReviewExperience::WasNotAvailable => ReportKind::Impossible,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewExperience::WasAllowed => "was_allowed",
            ReviewExperience::WasAllowedButBad => "was_allowed_but_bad",
            ReviewExperience::WasNotAllowed => "was_not_allowed",
            ReviewExperience::WasNotAvailable => "was_not_available",
        }
    }
}

impl fmt::Display for ReviewExperience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewExperience {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "was_allowed" => Ok(ReviewExperience::WasAllowed),
            "was_allowed_but_bad" => Ok(ReviewExperience::WasAllowedButBad),
            "was_not_allowed" => Ok(ReviewExperience::WasNotAllowed),
            "was_not_available" => Ok(ReviewExperience::WasNotAvailable),
            other => Err(Error::InvalidInput(format!(
                "unknown review experience '{}'",
                other
            ))),
        }
    }
}
