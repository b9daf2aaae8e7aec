//! Aggregation runner
//!
//! Recomputes the consensus experience of every (space, facility) pair of a
//! space from raw reviews. The store performs the reads and the swap as one
//! isolated unit, so a recompute either persists a snapshot that matches the
//! reviews it saw or nothing.

use crate::consensus::{self, MAX_CONSIDERED_REPORTS};
use crate::experience::Experience;
use crate::models::{
    ConsensusFacilityState, Facility, NewFacilityReview, NewSpace, RawFacilityReview, ReviewId,
    Space, SpaceId,
};
use crate::store::{ConsensusStore, ReviewSource, SpaceMetadata};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Derives and persists consensus rows for spaces
///
/// Within one process, recomputes of the same space queue on a per-space
/// lock instead of contending on the database. Across processes the store's
/// write transaction keeps them isolated.
pub struct FacilityAggregator<S> {
    store: Arc<S>,
    space_locks: Mutex<HashMap<SpaceId, Arc<Mutex<()>>>>,
}

/// Fold one pair, turning an undefined transition into an operator error
fn fold_facility(
    space_id: SpaceId,
    facility: &Facility,
    reviews: &[RawFacilityReview],
) -> Result<Experience> {
    let experience = consensus::fold_reviews(reviews).map_err(|source| {
        error!(
            "Aggregation inconsistency in space {} facility '{}' ({}): {}",
            space_id, facility.title, facility.id, source
        );
        Error::AggregationInconsistency {
            space_id,
            facility_id: facility.id,
            source,
        }
    })?;

    debug!(
        "Space {} facility {}: {} reviews -> {}",
        space_id,
        facility.id,
        reviews.len(),
        experience
    );
    Ok(experience)
}

impl<S> FacilityAggregator<S>
where
    S: ReviewSource + SpaceMetadata + ConsensusStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            space_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn space_lock(&self, space_id: SpaceId) -> Arc<Mutex<()>> {
        let mut locks = self.space_locks.lock().await;
        locks.entry(space_id).or_default().clone()
    }

    /// Drop the map entry once nobody else holds or waits on it
    async fn release_space_lock(&self, space_id: SpaceId, lock: Arc<Mutex<()>>) {
        let mut locks = self.space_locks.lock().await;
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&space_id);
        }
    }

    /// Recompute every consensus row of a space
    ///
    /// Returns the persisted rows in facility catalog order. On an undefined
    /// transition nothing is written and the previous rows stay in place.
    pub async fn recompute(&self, space_id: SpaceId) -> Result<Vec<ConsensusFacilityState>> {
        let lock = self.space_lock(space_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.store
                .aggregate_space(space_id, MAX_CONSIDERED_REPORTS, fold_facility)
                .await
        };
        self.release_space_lock(space_id, lock).await;

        let states = result?;
        info!("Recomputed space {}: {} facilities", space_id, states.len());
        Ok(states)
    }

    /// Recompute all spaces in ascending id order, stopping at the first error
    pub async fn recompute_all(&self) -> Result<usize> {
        let space_ids = self.store.space_ids().await?;
        for space_id in &space_ids {
            self.recompute(*space_id).await?;
        }
        info!("Recomputed {} spaces", space_ids.len());
        Ok(space_ids.len())
    }

    /// Store a raw review and refresh its space
    pub async fn submit_review(
        &self,
        review: &NewFacilityReview,
    ) -> Result<(RawFacilityReview, Vec<ConsensusFacilityState>)> {
        let stored = self.store.insert_review(review).await?;
        let states = self.recompute(stored.space_id).await?;
        Ok((stored, states))
    }

    /// Delete a raw review and refresh its space
    pub async fn remove_review(
        &self,
        review_id: ReviewId,
    ) -> Result<(RawFacilityReview, Vec<ConsensusFacilityState>)> {
        let removed = self.store.delete_review(review_id).await?;
        info!(
            "Removed review {} from space {} facility {}",
            removed.id, removed.space_id, removed.facility_id
        );
        let states = self.recompute(removed.space_id).await?;
        Ok((removed, states))
    }

    /// Create a space and run its initial aggregation
    ///
    /// A new space has no reviews, so every known facility starts `Unknown`.
    pub async fn register_space(
        &self,
        space: &NewSpace,
    ) -> Result<(Space, Vec<ConsensusFacilityState>)> {
        let created = self.store.insert_space(space).await?;
        info!("Registered space {} '{}'", created.id, created.title);
        let states = self.recompute(created.id).await?;
        Ok((created, states))
    }
}
