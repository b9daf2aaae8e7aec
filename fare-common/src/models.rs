//! Domain records shared by the engine and its storage collaborator

use crate::experience::{Experience, ReviewExperience};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SpaceId = i64;
pub type FacilityId = i64;
pub type CategoryId = i64;
pub type SpaceTypeId = i64;
pub type UserId = i64;
pub type ReviewId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityCategory {
    pub id: CategoryId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceType {
    pub id: SpaceTypeId,
    pub title: String,
}

/// Catalog entry for one accessibility feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub title: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A reviewed physical location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub title: String,
    /// Declared space types, ascending id
    pub space_type_ids: Vec<SpaceTypeId>,
}

/// Space to be registered
#[derive(Debug, Clone)]
pub struct NewSpace {
    pub title: String,
    pub space_type_ids: Vec<SpaceTypeId>,
}

/// One user's report about one facility at one space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFacilityReview {
    pub id: ReviewId,
    pub space_id: SpaceId,
    pub facility_id: FacilityId,
    pub user_id: UserId,
    pub experience: ReviewExperience,
    pub created_at: DateTime<Utc>,
}

/// Review to be inserted
#[derive(Debug, Clone)]
pub struct NewFacilityReview {
    pub space_id: SpaceId,
    pub facility_id: FacilityId,
    pub user_id: UserId,
    pub experience: ReviewExperience,
}

/// Derived consensus row for a (space, facility) pair
///
/// `experience` is written only by the aggregation runner. `description` is
/// curated by users and carried across recomputes untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusFacilityState {
    pub space_id: SpaceId,
    pub facility_id: FacilityId,
    pub experience: Experience,
    pub description: Option<String>,
}

/// New experience for one facility, produced by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusUpdate {
    pub facility_id: FacilityId,
    pub experience: Experience,
}

/// Consensus row joined with its facility's catalog data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceFacility {
    pub facility_id: FacilityId,
    pub title: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub experience: Experience,
    /// Categories this facility belongs to, ascending id
    pub categories: Vec<FacilityCategory>,
    /// Space types this facility is typically found on, ascending id
    pub space_type_ids: Vec<SpaceTypeId>,
}

/// A space with all of its facility rows, read as one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceProfile {
    pub space: Space,
    /// One entry per known facility, in facility catalog order
    pub facilities: Vec<SpaceFacility>,
}
