//! Facility filter scoring and ranking
//!
//! Lower scores are better: every desired facility the consensus believes
//! usable pulls a space up the list, every one believed unusable pushes it
//! down.

use crate::experience::Experience;
use crate::models::{FacilityId, SpaceFacility, SpaceProfile};
use crate::relevance;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Desired facility set supplied by a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacilityFilter {
    ids: BTreeSet<FacilityId>,
}

impl FacilityFilter {
    pub fn new<I: IntoIterator<Item = FacilityId>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: FacilityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = FacilityId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromStr for FacilityFilter {
    type Err = Error;

    /// Parse a comma-separated id list such as `"1, 4,7"`. Blank input is an
    /// empty filter.
    fn from_str(s: &str) -> Result<Self> {
        let mut ids = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id = part
                .parse::<FacilityId>()
                .map_err(|_| Error::InvalidFilterInput(format!("'{}' is not a facility id", part)))?;
            ids.insert(id);
        }
        Ok(Self { ids })
    }
}

/// Contribution of one desired facility to a space's score
pub fn experience_weight(experience: Experience) -> i32 {
    match experience {
        Experience::Likely => -2,
        Experience::Maybe => -1,
        Experience::Unknown => 0,
        Experience::Unlikely => 1,
        Experience::Impossible => 2,
    }
}

/// Score a space's relevant facilities against the desired set
pub fn score<'a, I>(filter: &FacilityFilter, relevant: I) -> i32
where
    I: IntoIterator<Item = &'a SpaceFacility>,
{
    relevant
        .into_iter()
        .filter(|facility| filter.contains(facility.facility_id))
        .map(|facility| experience_weight(facility.experience))
        .sum()
}

/// Score one space profile
pub fn score_space(filter: &FacilityFilter, profile: &SpaceProfile) -> i32 {
    score(filter, relevance::relevant(profile))
}

/// A space that survived filtering
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSpace<'a> {
    pub space: &'a SpaceProfile,
    pub score: i32,
    /// Relevant facilities that matched the filter
    pub matched: usize,
}

/// Filter and rank spaces, keeping the score of each survivor
///
/// With an empty filter every space is returned in input order with a score
/// of zero and no matches.
pub fn rank_with_scores<'a>(
    spaces: &'a [SpaceProfile],
    filter: &FacilityFilter,
) -> Vec<ScoredSpace<'a>> {
    if filter.is_empty() {
        return spaces
            .iter()
            .map(|space| ScoredSpace {
                space,
                score: 0,
                matched: 0,
            })
            .collect();
    }

    let mut scored: Vec<ScoredSpace<'a>> = spaces
        .iter()
        .filter_map(|space| {
            let matching: Vec<&SpaceFacility> = relevance::relevant(space)
                .into_iter()
                .filter(|facility| filter.contains(facility.facility_id))
                .collect();

            if matching.is_empty() {
                return None;
            }

            Some(ScoredSpace {
                space,
                score: score(filter, matching.iter().copied()),
                matched: matching.len(),
            })
        })
        .collect();

    // sort_by_key is stable: equal scores keep input order
    scored.sort_by_key(|entry| entry.score);
    scored
}

/// Filter and rank spaces, best match first
///
/// Spaces whose relevant facilities share nothing with the filter are
/// dropped. An empty filter returns the candidates unchanged.
pub fn filter_and_rank<'a>(
    spaces: &'a [SpaceProfile],
    filter: &FacilityFilter,
) -> Vec<&'a SpaceProfile> {
    if filter.is_empty() {
        return spaces.iter().collect();
    }

    rank_with_scores(spaces, filter)
        .into_iter()
        .map(|entry| entry.space)
        .collect()
}
