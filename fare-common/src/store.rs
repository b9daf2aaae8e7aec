//! Collaborator traits the engine reads from and writes to
//!
//! `db::SqliteStore` implements all three against the application database.

use crate::experience::Experience;
use crate::models::{
    ConsensusFacilityState, Facility, FacilityCategory, FacilityId,
    NewFacilityReview, NewSpace, RawFacilityReview, ReviewId, Space, SpaceId, SpaceProfile,
    SpaceTypeId,
};
use crate::Result;
use async_trait::async_trait;

/// Raw review and facility catalog access
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Every known facility, oldest first (ties broken by id)
    async fn known_facilities(&self) -> Result<Vec<Facility>>;

    /// Raw reviews for one pair in insertion order, optionally capped
    async fn reviews_for(
        &self,
        space_id: SpaceId,
        facility_id: FacilityId,
        limit: Option<usize>,
    ) -> Result<Vec<RawFacilityReview>>;

    async fn insert_review(&self, review: &NewFacilityReview) -> Result<RawFacilityReview>;

    /// Remove one raw review, returning it
    async fn delete_review(&self, review_id: ReviewId) -> Result<RawFacilityReview>;
}

/// Restricts which spaces a listing loads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceQuery {
    /// Keep spaces declaring at least one of these types. Empty keeps all.
    pub space_type_ids: Vec<SpaceTypeId>,
}

impl SpaceQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_space_types(space_type_ids: Vec<SpaceTypeId>) -> Self {
        Self { space_type_ids }
    }
}

/// Space, space type, and category metadata
#[async_trait]
pub trait SpaceMetadata: Send + Sync {
    async fn space(&self, space_id: SpaceId) -> Result<Space>;

    /// All space ids, ascending
    async fn space_ids(&self) -> Result<Vec<SpaceId>>;

    async fn insert_space(&self, space: &NewSpace) -> Result<Space>;

    async fn space_types_for_space(&self, space_id: SpaceId) -> Result<Vec<SpaceTypeId>>;

    async fn space_types_for_facility(&self, facility_id: FacilityId) -> Result<Vec<SpaceTypeId>>;

    async fn categories_for_facility(&self, facility_id: FacilityId)
        -> Result<Vec<FacilityCategory>>;

    /// A space joined with all of its consensus rows, from one consistent read
    async fn space_profile(&self, space_id: SpaceId) -> Result<SpaceProfile>;

    /// Profiles for every space matching `query`, ascending space id
    async fn space_profiles(&self, query: &SpaceQuery) -> Result<Vec<SpaceProfile>>;
}

/// Folds one facility's reviews (insertion order, already capped) into its
/// consensus experience
pub type ReviewFold = fn(SpaceId, &Facility, &[RawFacilityReview]) -> Result<Experience>;

/// Persistence of derived consensus rows
#[async_trait]
pub trait ConsensusStore: Send + Sync {
    /// Recompute a space from its raw reviews as one isolated unit
    ///
    /// Loads every known facility and up to `max_reports` reviews per pair,
    /// applies `fold`, and atomically replaces the space's rows with the
    /// result: one row per facility, curated descriptions of facilities
    /// present before and after kept. No review or consensus write from any
    /// other writer may land between the reads and the swap, and readers never
    /// observe a partially replaced set. If `fold` fails nothing is written.
    async fn aggregate_space(
        &self,
        space_id: SpaceId,
        max_reports: usize,
        fold: ReviewFold,
    ) -> Result<Vec<ConsensusFacilityState>>;

    /// Current rows for a space, in facility catalog order
    async fn consensus_for_space(&self, space_id: SpaceId) -> Result<Vec<ConsensusFacilityState>>;

    /// Set the curated description of one row
    async fn set_description(
        &self,
        space_id: SpaceId,
        facility_id: FacilityId,
        description: Option<&str>,
    ) -> Result<()>;
}

