//! SQLite implementation of the engine's collaborators

use crate::experience::{Experience, ReviewExperience};
use crate::models::{
    ConsensusFacilityState, ConsensusUpdate, Facility, FacilityCategory, FacilityId,
    NewFacilityReview, NewSpace, RawFacilityReview, ReviewId, Space, SpaceFacility, SpaceId,
    SpaceProfile, SpaceTypeId,
};
use crate::store::{ConsensusStore, ReviewFold, ReviewSource, SpaceMetadata, SpaceQuery};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Engine storage backed by the application database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn facility_from_row(row: &SqliteRow) -> Result<Facility> {
    let created_at: NaiveDateTime = row.try_get("created_at")?;
    Ok(Facility {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        icon: row.try_get("icon")?,
        created_at: created_at.and_utc(),
    })
}

fn review_from_row(row: &SqliteRow) -> Result<RawFacilityReview> {
    let experience: String = row.try_get("experience")?;
    let created_at: NaiveDateTime = row.try_get("created_at")?;
    Ok(RawFacilityReview {
        id: row.try_get("id")?,
        space_id: row.try_get("space_id")?,
        facility_id: row.try_get("facility_id")?,
        user_id: row.try_get("user_id")?,
        experience: experience.parse::<ReviewExperience>()?,
        created_at: created_at.and_utc(),
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

async fn fetch_space(conn: &mut SqliteConnection, space_id: SpaceId) -> Result<Space> {
    let title: Option<String> = sqlx::query_scalar("SELECT title FROM spaces WHERE id = ?")
        .bind(space_id)
        .fetch_optional(&mut *conn)
        .await?;
    let title = title.ok_or_else(|| Error::NotFound(format!("space {}", space_id)))?;

    let space_type_ids = fetch_space_types_for_space(conn, space_id).await?;

    Ok(Space {
        id: space_id,
        title,
        space_type_ids,
    })
}

async fn fetch_space_types_for_space(
    conn: &mut SqliteConnection,
    space_id: SpaceId,
) -> Result<Vec<SpaceTypeId>> {
    let ids = sqlx::query_scalar(
        "SELECT space_type_id FROM space_space_types WHERE space_id = ? ORDER BY space_type_id",
    )
    .bind(space_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Catalog lookups shared by every profile in one read
struct CatalogMaps {
    categories: HashMap<FacilityId, Vec<FacilityCategory>>,
    space_types: HashMap<FacilityId, Vec<SpaceTypeId>>,
}

impl CatalogMaps {
    async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let mut categories: HashMap<FacilityId, Vec<FacilityCategory>> = HashMap::new();
        let rows = sqlx::query(
            r#"
            SELECT m.facility_id, c.id, c.title
            FROM facility_category_memberships m
            JOIN facility_categories c ON c.id = m.category_id
            ORDER BY m.facility_id, c.id
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        for row in rows {
            categories
                .entry(row.try_get("facility_id")?)
                .or_default()
                .push(FacilityCategory {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                });
        }

        let mut space_types: HashMap<FacilityId, Vec<SpaceTypeId>> = HashMap::new();
        let rows: Vec<(FacilityId, SpaceTypeId)> = sqlx::query_as(
            "SELECT facility_id, space_type_id FROM facility_space_types ORDER BY facility_id, space_type_id",
        )
        .fetch_all(&mut *conn)
        .await?;
        for (facility_id, space_type_id) in rows {
            space_types.entry(facility_id).or_default().push(space_type_id);
        }

        Ok(Self {
            categories,
            space_types,
        })
    }
}

async fn fetch_profile(
    conn: &mut SqliteConnection,
    maps: &CatalogMaps,
    space_id: SpaceId,
) -> Result<SpaceProfile> {
    let space = fetch_space(conn, space_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT f.id, f.title, f.icon, sf.experience, sf.description
        FROM space_facilities sf
        JOIN facilities f ON f.id = sf.facility_id
        WHERE sf.space_id = ?
        ORDER BY f.created_at, f.id
        "#,
    )
    .bind(space_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut facilities = Vec::with_capacity(rows.len());
    for row in rows {
        let facility_id: FacilityId = row.try_get("id")?;
        let experience: String = row.try_get("experience")?;
        facilities.push(SpaceFacility {
            facility_id,
            title: row.try_get("title")?,
            icon: row.try_get("icon")?,
            description: row.try_get("description")?,
            experience: experience.parse::<Experience>()?,
            categories: maps.categories.get(&facility_id).cloned().unwrap_or_default(),
            space_type_ids: maps.space_types.get(&facility_id).cloned().unwrap_or_default(),
        });
    }

    Ok(SpaceProfile { space, facilities })
}

async fn fetch_facilities(conn: &mut SqliteConnection) -> Result<Vec<Facility>> {
    let rows = sqlx::query("SELECT id, title, icon, created_at FROM facilities ORDER BY created_at, id")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(facility_from_row).collect()
}

async fn fetch_reviews(
    conn: &mut SqliteConnection,
    space_id: SpaceId,
    facility_id: FacilityId,
    limit: Option<usize>,
) -> Result<Vec<RawFacilityReview>> {
    // LIMIT -1 means no limit in SQLite
    let limit = limit.map(|n| n as i64).unwrap_or(-1);

    let rows = sqlx::query(
        r#"
        SELECT id, space_id, facility_id, user_id, experience, created_at
        FROM facility_reviews
        WHERE space_id = ? AND facility_id = ?
        ORDER BY id
        LIMIT ?
        "#,
    )
    .bind(space_id)
    .bind(facility_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(review_from_row).collect()
}

/// Replace every consensus row of a space inside the caller's transaction
///
/// Descriptions of facilities present before and after are carried over.
async fn swap_consensus(
    conn: &mut SqliteConnection,
    space_id: SpaceId,
    updates: &[ConsensusUpdate],
) -> Result<Vec<ConsensusFacilityState>> {
    let previous: Vec<(FacilityId, Option<String>)> = sqlx::query_as(
        "DELETE FROM space_facilities WHERE space_id = ? RETURNING facility_id, description",
    )
    .bind(space_id)
    .fetch_all(&mut *conn)
    .await?;
    let descriptions: HashMap<FacilityId, String> = previous
        .into_iter()
        .filter_map(|(facility_id, description)| description.map(|d| (facility_id, d)))
        .collect();

    let mut states = Vec::with_capacity(updates.len());
    for update in updates {
        let description = descriptions.get(&update.facility_id).cloned();

        sqlx::query(
            r#"
            INSERT INTO space_facilities (space_id, facility_id, experience, description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(space_id)
        .bind(update.facility_id)
        .bind(update.experience.as_str())
        .bind(&description)
        .execute(&mut *conn)
        .await?;

        states.push(ConsensusFacilityState {
            space_id,
            facility_id: update.facility_id,
            experience: update.experience,
            description,
        });
    }

    Ok(states)
}

/// Read, fold, and swap one space on a connection that holds the write lock
async fn aggregate_locked(
    conn: &mut SqliteConnection,
    space_id: SpaceId,
    max_reports: usize,
    fold: ReviewFold,
) -> Result<Vec<ConsensusFacilityState>> {
    let space = fetch_space(conn, space_id).await?;

    let facilities = fetch_facilities(conn).await?;
    let mut updates = Vec::with_capacity(facilities.len());
    for facility in &facilities {
        let reviews = fetch_reviews(conn, space.id, facility.id, Some(max_reports)).await?;
        updates.push(ConsensusUpdate {
            facility_id: facility.id,
            experience: fold(space.id, facility, &reviews)?,
        });
    }

    swap_consensus(conn, space.id, &updates).await
}

#[async_trait]
impl ReviewSource for SqliteStore {
    async fn known_facilities(&self) -> Result<Vec<Facility>> {
        let mut conn = self.pool.acquire().await?;
        fetch_facilities(&mut conn).await
    }

    async fn reviews_for(
        &self,
        space_id: SpaceId,
        facility_id: FacilityId,
        limit: Option<usize>,
    ) -> Result<Vec<RawFacilityReview>> {
        let mut conn = self.pool.acquire().await?;
        fetch_reviews(&mut conn, space_id, facility_id, limit).await
    }

    async fn insert_review(&self, review: &NewFacilityReview) -> Result<RawFacilityReview> {
        let space_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM spaces WHERE id = ?)")
            .bind(review.space_id)
            .fetch_one(&self.pool)
            .await?;
        if !space_exists {
            return Err(Error::NotFound(format!("space {}", review.space_id)));
        }

        let facility_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM facilities WHERE id = ?)")
                .bind(review.facility_id)
                .fetch_one(&self.pool)
                .await?;
        if !facility_exists {
            return Err(Error::NotFound(format!("facility {}", review.facility_id)));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO facility_reviews (space_id, facility_id, user_id, experience)
            VALUES (?, ?, ?, ?)
            RETURNING id, space_id, facility_id, user_id, experience, created_at
            "#,
        )
        .bind(review.space_id)
        .bind(review.facility_id)
        .bind(review.user_id)
        .bind(review.experience.as_str())
        .fetch_one(&self.pool)
        .await?;
        let inserted = review_from_row(&row)?;

        debug!(
            "Stored review {} for space {} facility {}: {}",
            inserted.id, inserted.space_id, inserted.facility_id, inserted.experience
        );
        Ok(inserted)
    }

    async fn delete_review(&self, review_id: ReviewId) -> Result<RawFacilityReview> {
        let row = sqlx::query(
            r#"
            DELETE FROM facility_reviews
            WHERE id = ?
            RETURNING id, space_id, facility_id, user_id, experience, created_at
            "#,
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("review {}", review_id)))?;
        let deleted = review_from_row(&row)?;

        debug!(
            "Deleted review {} for space {} facility {}",
            deleted.id, deleted.space_id, deleted.facility_id
        );
        Ok(deleted)
    }
}

#[async_trait]
impl SpaceMetadata for SqliteStore {
    async fn space(&self, space_id: SpaceId) -> Result<Space> {
        let mut conn = self.pool.acquire().await?;
        fetch_space(&mut conn, space_id).await
    }

    async fn space_ids(&self) -> Result<Vec<SpaceId>> {
        let ids = sqlx::query_scalar("SELECT id FROM spaces ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn insert_space(&self, space: &NewSpace) -> Result<Space> {
        let mut tx = self.pool.begin().await?;

        let id: SpaceId = sqlx::query_scalar("INSERT INTO spaces (title) VALUES (?) RETURNING id")
            .bind(&space.title)
            .fetch_one(&mut *tx)
            .await?;

        for space_type_id in &space.space_type_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO space_space_types (space_id, space_type_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(space_type_id)
            .execute(&mut *tx)
            .await?;
        }

        let inserted = fetch_space(&mut tx, id).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn space_types_for_space(&self, space_id: SpaceId) -> Result<Vec<SpaceTypeId>> {
        let mut conn = self.pool.acquire().await?;
        fetch_space_types_for_space(&mut conn, space_id).await
    }

    async fn space_types_for_facility(&self, facility_id: FacilityId) -> Result<Vec<SpaceTypeId>> {
        let ids = sqlx::query_scalar(
            "SELECT space_type_id FROM facility_space_types WHERE facility_id = ? ORDER BY space_type_id",
        )
        .bind(facility_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn categories_for_facility(
        &self,
        facility_id: FacilityId,
    ) -> Result<Vec<FacilityCategory>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT c.id, c.title
            FROM facility_category_memberships m
            JOIN facility_categories c ON c.id = m.category_id
            WHERE m.facility_id = ?
            ORDER BY c.id
            "#,
        )
        .bind(facility_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, title)| FacilityCategory { id, title })
            .collect())
    }

    async fn space_profile(&self, space_id: SpaceId) -> Result<SpaceProfile> {
        // One read transaction so a concurrent recompute is seen fully or not at all
        let mut tx = self.pool.begin().await?;
        let maps = CatalogMaps::load(&mut tx).await?;
        let profile = fetch_profile(&mut tx, &maps, space_id).await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn space_profiles(&self, query: &SpaceQuery) -> Result<Vec<SpaceProfile>> {
        let mut tx = self.pool.begin().await?;

        let space_ids: Vec<SpaceId> = if query.space_type_ids.is_empty() {
            sqlx::query_scalar("SELECT id FROM spaces ORDER BY id")
                .fetch_all(&mut *tx)
                .await?
        } else {
            let sql = format!(
                "SELECT DISTINCT space_id FROM space_space_types WHERE space_type_id IN ({}) ORDER BY space_id",
                placeholders(query.space_type_ids.len())
            );
            let mut q = sqlx::query_scalar::<_, SpaceId>(&sql);
            for id in &query.space_type_ids {
                q = q.bind(id);
            }
            q.fetch_all(&mut *tx).await?
        };

        let maps = CatalogMaps::load(&mut tx).await?;
        let mut profiles = Vec::with_capacity(space_ids.len());
        for space_id in space_ids {
            profiles.push(fetch_profile(&mut tx, &maps, space_id).await?);
        }

        tx.commit().await?;
        Ok(profiles)
    }
}

#[async_trait]
impl ConsensusStore for SqliteStore {
    async fn aggregate_space(
        &self,
        space_id: SpaceId,
        max_reports: usize,
        fold: ReviewFold,
    ) -> Result<Vec<ConsensusFacilityState>> {
        let mut conn = self.pool.acquire().await?;

        // Write lock before the first read: no other connection, in this
        // process or another, can commit reviews or rows until we finish
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = match aggregate_locked(&mut conn, space_id, max_reports, fold).await {
            Ok(states) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| states)
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!("Rollback of space {} aggregation failed: {}", space_id, e);
            }
        } else {
            debug!("Aggregated space {} under write lock", space_id);
        }
        outcome
    }

    async fn consensus_for_space(&self, space_id: SpaceId) -> Result<Vec<ConsensusFacilityState>> {
        let rows = sqlx::query(
            r#"
            SELECT sf.facility_id, sf.experience, sf.description
            FROM space_facilities sf
            JOIN facilities f ON f.id = sf.facility_id
            WHERE sf.space_id = ?
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(space_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ConsensusFacilityState> {
                let experience: String = row.try_get("experience")?;
                Ok(ConsensusFacilityState {
                    space_id,
                    facility_id: row.try_get("facility_id")?,
                    experience: experience.parse::<Experience>()?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn set_description(
        &self,
        space_id: SpaceId,
        facility_id: FacilityId,
        description: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE space_facilities
            SET description = ?, updated_at = CURRENT_TIMESTAMP
            WHERE space_id = ? AND facility_id = ?
            "#,
        )
        .bind(description)
        .bind(space_id)
        .bind(facility_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "consensus row for space {} facility {}",
                space_id, facility_id
            )));
        }
        Ok(())
    }
}
