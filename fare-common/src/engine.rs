//! Engine facade
//!
//! Ties the aggregation runner, the relevance classifier, and the scorer to
//! one storage backend. Read operations load a `SpaceProfile` snapshot and
//! hand it to the pure modules.

use crate::aggregation::FacilityAggregator;
use crate::experience::Experience;
use crate::models::{
    CategoryId, ConsensusFacilityState, FacilityId, NewFacilityReview, NewSpace,
    RawFacilityReview, ReviewId, Space, SpaceFacility, SpaceId, SpaceProfile,
};
use crate::relevance::{self, CategoryEntry, CategoryGroups, Relevance};
use crate::scoring::{self, FacilityFilter};
use crate::store::{ConsensusStore, ReviewSource, SpaceMetadata, SpaceQuery};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;

/// Facilities of one space, flat or grouped by category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FacilityListing {
    Flat(Vec<SpaceFacility>),
    Grouped(CategoryGroups),
}

/// Owned ranking result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedSpace {
    pub space: SpaceProfile,
    pub score: i32,
    pub matched: usize,
}

pub struct FacilityEngine<S> {
    store: Arc<S>,
    aggregator: FacilityAggregator<S>,
}

impl<S> FacilityEngine<S>
where
    S: ReviewSource + SpaceMetadata + ConsensusStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            aggregator: FacilityAggregator::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn recompute(&self, space_id: SpaceId) -> Result<Vec<ConsensusFacilityState>> {
        self.aggregator.recompute(space_id).await
    }

    pub async fn recompute_all(&self) -> Result<usize> {
        self.aggregator.recompute_all().await
    }

    pub async fn submit_review(
        &self,
        review: &NewFacilityReview,
    ) -> Result<(RawFacilityReview, Vec<ConsensusFacilityState>)> {
        self.aggregator.submit_review(review).await
    }

    pub async fn remove_review(
        &self,
        review_id: ReviewId,
    ) -> Result<(RawFacilityReview, Vec<ConsensusFacilityState>)> {
        self.aggregator.remove_review(review_id).await
    }

    pub async fn register_space(
        &self,
        space: &NewSpace,
    ) -> Result<(Space, Vec<ConsensusFacilityState>)> {
        self.aggregator.register_space(space).await
    }

    async fn profile(&self, space_id: SpaceId) -> Result<SpaceProfile> {
        self.store.space_profile(space_id).await
    }

    /// Relevant or non-relevant facilities of a space
    pub async fn listing(
        &self,
        space_id: SpaceId,
        relevance: Relevance,
        grouped: bool,
    ) -> Result<FacilityListing> {
        let profile = self.profile(space_id).await?;

        let listing = if grouped {
            FacilityListing::Grouped(relevance::classify_by_category(&profile, relevance))
        } else {
            FacilityListing::Flat(
                relevance::classify(&profile, relevance)
                    .into_iter()
                    .cloned()
                    .collect(),
            )
        };
        Ok(listing)
    }

    /// Every facility of one category at a space, relevant or not
    pub async fn category_listing(
        &self,
        space_id: SpaceId,
        category_id: CategoryId,
    ) -> Result<Vec<CategoryEntry>> {
        let profile = self.profile(space_id).await?;
        Ok(relevance::facilities_in_category(&profile, category_id))
    }

    /// Consensus experience of one facility, `None` if the space has no row for it
    pub async fn experience(
        &self,
        space_id: SpaceId,
        facility_id: FacilityId,
    ) -> Result<Option<Experience>> {
        let profile = self.profile(space_id).await?;
        Ok(relevance::experience_for(&profile, facility_id))
    }

    /// Spaces matching `query`, filtered and ranked against `filter`
    pub async fn filter_and_rank(
        &self,
        query: &SpaceQuery,
        filter: &FacilityFilter,
    ) -> Result<Vec<SpaceProfile>> {
        let spaces = self.store.space_profiles(query).await?;
        if filter.is_empty() {
            return Ok(spaces);
        }

        Ok(scoring::filter_and_rank(&spaces, filter)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Like `filter_and_rank`, keeping each survivor's score
    pub async fn rank(
        &self,
        query: &SpaceQuery,
        filter: &FacilityFilter,
    ) -> Result<Vec<RankedSpace>> {
        let spaces = self.store.space_profiles(query).await?;

        Ok(scoring::rank_with_scores(&spaces, filter)
            .into_iter()
            .map(|entry| RankedSpace {
                space: entry.space.clone(),
                score: entry.score,
                matched: entry.matched,
            })
            .collect())
    }

    pub async fn score(&self, space_id: SpaceId, filter: &FacilityFilter) -> Result<i32> {
        let profile = self.profile(space_id).await?;
        Ok(scoring::score_space(filter, &profile))
    }

    pub async fn set_description(
        &self,
        space_id: SpaceId,
        facility_id: FacilityId,
        description: Option<&str>,
    ) -> Result<()> {
        self.store
            .set_description(space_id, facility_id, description)
            .await
    }
}
