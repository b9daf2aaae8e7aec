//! Consensus state machine
//!
//! Folds the raw reports for one (space, facility) pair into a single
//! `Experience`. The fold starts at `Unknown` and consumes at most
//! `MAX_CONSIDERED_REPORTS` reports in insertion order; later reports never
//! influence the result.
//!
//! | current    | report     | next       |
//! |------------|------------|------------|
//! | Unknown    | positive   | Likely     |
//! | Unknown    | negative   | Unlikely   |
//! | Likely     | positive   | Likely     |
//! | Likely     | negative   | Maybe      |
//! | Unlikely   | positive   | Maybe      |
//! | Unlikely   | negative   | Unlikely   |
//! | Maybe      | positive   | Maybe      |
//! | Maybe      | negative   | Maybe      |
//! | any        | impossible | Impossible |
//! | Impossible | negative   | Impossible |
//! | Impossible | positive   | undefined  |

use crate::experience::{Experience, ReportKind};
use crate::models::RawFacilityReview;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of reports per pair that take part in the fold
pub const MAX_CONSIDERED_REPORTS: usize = 5;

/// The fold reached a (state, report) combination with no defined outcome
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[error("no transition from '{state}' on a {report} report (report #{position})")]
pub struct UndefinedTransition {
    pub state: Experience,
    pub report: ReportKind,
    /// Zero-based index of the offending report
    pub position: usize,
}

/// Transition table. `None` marks an undefined transition.
pub fn transition(state: Experience, report: ReportKind) -> Option<Experience> {
    use Experience::*;

    match (state, report) {
        (_, ReportKind::Impossible) => Some(Impossible),

        (Unknown, ReportKind::Positive) => Some(Likely),
        (Unknown, ReportKind::Negative) => Some(Unlikely),

        (Likely, ReportKind::Positive) => Some(Likely),
        (Likely, ReportKind::Negative) => Some(Maybe),

        (Unlikely, ReportKind::Positive) => Some(Maybe),
        (Unlikely, ReportKind::Negative) => Some(Unlikely),

        // Conflict stays a conflict until an impossible report settles it
        (Maybe, ReportKind::Positive | ReportKind::Negative) => Some(Maybe),

        (Impossible, ReportKind::Negative) => Some(Impossible),
        (Impossible, ReportKind::Positive) => None,
    }
}

/// Fold classified reports (insertion order) into a consensus experience
pub fn fold_reports<I>(reports: I) -> Result<Experience, UndefinedTransition>
where
    I: IntoIterator<Item = ReportKind>,
{
    reports
        .into_iter()
        .take(MAX_CONSIDERED_REPORTS)
        .enumerate()
        .try_fold(Experience::Unknown, |state, (position, report)| {
            transition(state, report).ok_or(UndefinedTransition {
                state,
                report,
                position,
            })
        })
}

/// Fold raw reviews, already ordered by insertion
pub fn fold_reviews(reviews: &[RawFacilityReview]) -> Result<Experience, UndefinedTransition> {
    fold_reports(reviews.iter().map(|review| review.experience.kind()))
}
