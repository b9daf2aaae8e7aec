//! End-to-end engine tests against a temporary SQLite database

use fare_common::config::DatabaseConfig;
use fare_common::db::{
    import_catalog, init_database, insert_category, insert_facility, insert_space_type,
    CatalogFile, NewFacility, SqliteStore,
};
use fare_common::experience::ReviewExperience::{
    self, WasAllowed, WasAllowedButBad, WasNotAllowed, WasNotAvailable,
};
use fare_common::consensus::{fold_reviews, MAX_CONSIDERED_REPORTS};
use fare_common::models::{FacilityId, NewFacilityReview, NewSpace, SpaceId};
use fare_common::relevance::Relevance;
use fare_common::scoring::FacilityFilter;
use fare_common::store::{ConsensusStore, ReviewSource, SpaceMetadata, SpaceQuery};
use fare_common::{Error, Experience, FacilityEngine, FacilityListing};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    pool: SqlitePool,
    engine: Arc<FacilityEngine<SqliteStore>>,
}

impl Fixture {
    fn store(&self) -> &SqliteStore {
        self.engine.store()
    }

    /// Separate pool on the same file, as another process would open it
    async fn second_pool(&self) -> SqlitePool {
        init_database(&self.dir.path().join("fare.db"), &DatabaseConfig::default())
            .await
            .unwrap()
    }

    async fn facility(&self, title: &str, category_ids: &[i64], space_type_ids: &[i64]) -> FacilityId {
        let mut conn = self.pool.acquire().await.unwrap();
        insert_facility(
            &mut conn,
            &NewFacility {
                title: title.to_string(),
                icon: None,
                category_ids: category_ids.to_vec(),
                space_type_ids: space_type_ids.to_vec(),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn space(&self, title: &str, space_type_ids: &[i64]) -> SpaceId {
        let (space, _) = self
            .engine
            .register_space(&NewSpace {
                title: title.to_string(),
                space_type_ids: space_type_ids.to_vec(),
            })
            .await
            .unwrap();
        space.id
    }

    /// Store reviews without triggering aggregation
    async fn reviews(&self, space_id: SpaceId, facility_id: FacilityId, reviews: &[ReviewExperience]) {
        for (user_id, experience) in reviews.iter().enumerate() {
            self.store()
                .insert_review(&NewFacilityReview {
                    space_id,
                    facility_id,
                    user_id: user_id as i64 + 1,
                    experience: *experience,
                })
                .await
                .unwrap();
        }
    }

    async fn experience(&self, space_id: SpaceId, facility_id: FacilityId) -> Experience {
        self.store()
            .consensus_for_space(space_id)
            .await
            .unwrap()
            .into_iter()
            .find(|row| row.facility_id == facility_id)
            .map(|row| row.experience)
            .unwrap()
    }
}

async fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("fare.db"), &DatabaseConfig::default())
        .await
        .unwrap();
    let engine = Arc::new(FacilityEngine::new(Arc::new(SqliteStore::new(pool.clone()))));
    Fixture {
        dir,
        pool,
        engine,
    }
}

#[tokio::test]
async fn test_register_space_starts_all_unknown() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let lift = fx.facility("Lift", &[], &[]).await;

    let (space, rows) = fx
        .engine
        .register_space(&NewSpace {
            title: "Library".to_string(),
            space_type_ids: vec![],
        })
        .await
        .unwrap();

    assert_eq!(space.title, "Library");
    let ids: Vec<_> = rows.iter().map(|r| r.facility_id).collect();
    assert_eq!(ids, vec![ramp, lift]);
    assert!(rows.iter().all(|r| r.experience == Experience::Unknown));
}

#[tokio::test]
async fn test_submit_review_updates_consensus() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;

    let review = NewFacilityReview {
        space_id: space,
        facility_id: ramp,
        user_id: 7,
        experience: WasAllowedButBad,
    };
    let (stored, rows) = fx.engine.submit_review(&review).await.unwrap();
    assert_eq!(stored.user_id, 7);
    assert_eq!(rows[0].experience, Experience::Likely);

    let review = NewFacilityReview {
        experience: WasNotAllowed,
        ..review
    };
    fx.engine.submit_review(&review).await.unwrap();
    assert_eq!(fx.experience(space, ramp).await, Experience::Maybe);
}

#[tokio::test]
async fn test_review_for_unknown_space_is_not_found() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;

    let result = fx
        .engine
        .submit_review(&NewFacilityReview {
            space_id: 42,
            facility_id: ramp,
            user_id: 1,
            experience: WasAllowed,
        })
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let lift = fx.facility("Lift", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    fx.reviews(space, ramp, &[WasAllowed, WasNotAllowed]).await;
    fx.reviews(space, lift, &[WasNotAvailable]).await;

    let first = fx.engine.recompute(space).await.unwrap();
    let second = fx.engine.recompute(space).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].experience, Experience::Maybe);
    assert_eq!(first[1].experience, Experience::Impossible);
}

#[tokio::test]
async fn test_reports_after_the_fifth_are_ignored() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    fx.reviews(space, ramp, &[WasAllowed; 5]).await;
    fx.engine.recompute(space).await.unwrap();
    assert_eq!(fx.experience(space, ramp).await, Experience::Likely);

    fx.reviews(space, ramp, &[WasNotAvailable]).await;
    fx.engine.recompute(space).await.unwrap();
    assert_eq!(fx.experience(space, ramp).await, Experience::Likely);
}

#[tokio::test]
async fn test_inconsistency_leaves_previous_rows() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let lift = fx.facility("Lift", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    fx.reviews(space, lift, &[WasAllowed]).await;
    fx.engine.recompute(space).await.unwrap();

    fx.reviews(space, ramp, &[WasNotAvailable, WasAllowed]).await;
    let err = fx.engine.recompute(space).await.unwrap_err();
    match err {
        Error::AggregationInconsistency {
            space_id,
            facility_id,
            ..
        } => {
            assert_eq!(space_id, space);
            assert_eq!(facility_id, ramp);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fx.experience(space, ramp).await, Experience::Unknown);
    assert_eq!(fx.experience(space, lift).await, Experience::Likely);
}

#[tokio::test]
async fn test_rows_follow_the_facility_catalog() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    let lift = fx.facility("Lift", &[], &[]).await;

    assert_eq!(fx.store().consensus_for_space(space).await.unwrap().len(), 1);

    let rows = fx.engine.recompute(space).await.unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.facility_id).collect();
    assert_eq!(ids, vec![ramp, lift]);
}

#[tokio::test]
async fn test_description_survives_recompute() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;

    fx.engine
        .set_description(space, ramp, Some("Side entrance on Elm St."))
        .await
        .unwrap();
    fx.reviews(space, ramp, &[WasAllowed]).await;
    let rows = fx.engine.recompute(space).await.unwrap();

    assert_eq!(rows[0].experience, Experience::Likely);
    assert_eq!(rows[0].description.as_deref(), Some("Side entrance on Elm St."));
    let stored = fx.store().consensus_for_space(space).await.unwrap();
    assert_eq!(stored[0].description.as_deref(), Some("Side entrance on Elm St."));
}

#[tokio::test]
async fn test_recompute_unknown_space_is_not_found() {
    let fx = setup().await;
    assert!(matches!(fx.engine.recompute(9).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_recompute_all_visits_every_space() {
    let fx = setup().await;
    let a = fx.space("Library", &[]).await;
    let b = fx.space("Museum", &[]).await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    fx.reviews(b, ramp, &[WasNotAllowed]).await;

    assert_eq!(fx.engine.recompute_all().await.unwrap(), 2);
    assert_eq!(fx.experience(a, ramp).await, Experience::Unknown);
    assert_eq!(fx.experience(b, ramp).await, Experience::Unlikely);
}

#[tokio::test]
async fn test_concurrent_recomputes_of_one_space() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    fx.reviews(space, ramp, &[WasAllowed, WasAllowed]).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = fx.engine.clone();
            tokio::spawn(async move { engine.recompute(space).await })
        })
        .collect();
    for handle in handles {
        let rows = handle.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].experience, Experience::Likely);
    }
}

#[tokio::test]
async fn test_recompute_waits_for_a_writer_on_another_connection() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    fx.reviews(space, ramp, &[WasAllowed]).await;

    // Another process is mid-way through writing a negative review
    let other = fx.second_pool().await;
    let mut tx = other.begin().await.unwrap();
    sqlx::query(
        "INSERT INTO facility_reviews (space_id, facility_id, user_id, experience) VALUES (?, ?, 9, ?)",
    )
    .bind(space)
    .bind(ramp)
    .bind(WasNotAllowed.as_str())
    .execute(&mut *tx)
    .await
    .unwrap();

    let engine = fx.engine.clone();
    let recompute = tokio::spawn(async move { engine.recompute(space).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!recompute.is_finished(), "recompute ran while another writer held the lock");

    tx.commit().await.unwrap();
    let rows = recompute.await.unwrap().unwrap();
    assert_eq!(rows[0].experience, Experience::Maybe);
    assert_eq!(fx.experience(space, ramp).await, Experience::Maybe);
    other.close().await;
}

#[tokio::test]
async fn test_engines_sharing_a_database_keep_consensus_current() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let lift = fx.facility("Lift", &[], &[]).await;
    let space = fx.space("Library", &[]).await;

    // One engine on the fixture pool, one on a pool of its own
    let other = fx.second_pool().await;
    let engines = [
        fx.engine.clone(),
        Arc::new(FacilityEngine::new(Arc::new(SqliteStore::new(other.clone())))),
    ];

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = engines[i % 2].clone();
            let facility_id = if i % 4 < 2 { ramp } else { lift };
            let experience = if i % 3 == 0 { WasNotAllowed } else { WasAllowed };
            tokio::spawn(async move {
                engine
                    .submit_review(&NewFacilityReview {
                        space_id: space,
                        facility_id,
                        user_id: i as i64 + 1,
                        experience,
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for facility_id in [ramp, lift] {
        let reviews = fx
            .store()
            .reviews_for(space, facility_id, Some(MAX_CONSIDERED_REPORTS))
            .await
            .unwrap();
        let expected = fold_reviews(&reviews).unwrap();
        assert_eq!(fx.experience(space, facility_id).await, expected);
    }
    other.close().await;
}

#[tokio::test]
async fn test_removing_a_review_recomputes_its_space() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;

    let review = |user_id, experience| NewFacilityReview {
        space_id: space,
        facility_id: ramp,
        user_id,
        experience,
    };
    fx.engine.submit_review(&review(1, WasAllowed)).await.unwrap();
    let (negative, rows) = fx.engine.submit_review(&review(2, WasNotAllowed)).await.unwrap();
    assert_eq!(rows[0].experience, Experience::Maybe);

    let (removed, rows) = fx.engine.remove_review(negative.id).await.unwrap();
    assert_eq!(removed.id, negative.id);
    assert_eq!(removed.experience, WasNotAllowed);
    assert_eq!(rows[0].experience, Experience::Likely);
    assert_eq!(fx.experience(space, ramp).await, Experience::Likely);
    assert_eq!(fx.store().reviews_for(space, ramp, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_removing_an_unknown_review_is_not_found() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let space = fx.space("Library", &[]).await;
    fx.reviews(space, ramp, &[WasAllowed]).await;
    fx.engine.recompute(space).await.unwrap();

    assert!(matches!(
        fx.engine.remove_review(999).await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(fx.experience(space, ramp).await, Experience::Likely);
}

#[tokio::test]
async fn test_category_listing_and_single_experience() {
    let fx = setup().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let library = insert_space_type(&mut conn, "Library").await.unwrap();
    let entrance = insert_category(&mut conn, "Entrance").await.unwrap();
    drop(conn);

    let ramp = fx.facility("Ramp", &[entrance.id], &[library.id]).await;
    let door = fx.facility("Automatic door", &[entrance.id], &[]).await;
    let lift = fx.facility("Lift", &[], &[]).await;
    let space = fx.space("Central Library", &[library.id]).await;
    fx.reviews(space, door, &[WasNotAvailable]).await;
    fx.engine.recompute(space).await.unwrap();

    // Relevance plays no part here: the impossible door is still listed
    let entries = fx.engine.category_listing(space, entrance.id).await.unwrap();
    let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Ramp", "Automatic door"]);
    assert_eq!(entries[1].experience, Experience::Impossible);

    assert_eq!(
        fx.engine.experience(space, ramp).await.unwrap(),
        Some(Experience::Unknown)
    );
    assert_eq!(
        fx.engine.experience(space, lift).await.unwrap(),
        Some(Experience::Unknown)
    );
    assert_eq!(fx.engine.experience(space, 999).await.unwrap(), None);
    assert!(matches!(
        fx.engine.experience(999, ramp).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_listing_splits_relevant_and_non_relevant() {
    let fx = setup().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let library = insert_space_type(&mut conn, "Library").await.unwrap();
    let entrance = insert_category(&mut conn, "Entrance").await.unwrap();
    let toilets = insert_category(&mut conn, "Toilets").await.unwrap();
    drop(conn);

    // typical, no reviews
    let ramp = fx.facility("Ramp", &[entrance.id], &[library.id]).await;
    // atypical, reviewed
    let changing = fx.facility("Changing table", &[toilets.id], &[]).await;
    // atypical, unreviewed
    let pool_lift = fx.facility("Pool lift", &[], &[]).await;
    // atypical, impossible
    let door = fx.facility("Automatic door", &[entrance.id], &[]).await;

    let space = fx.space("Central Library", &[library.id]).await;
    fx.reviews(space, changing, &[WasAllowed]).await;
    fx.reviews(space, door, &[WasNotAvailable]).await;
    fx.engine.recompute(space).await.unwrap();

    let relevant = match fx.engine.listing(space, Relevance::Relevant, false).await.unwrap() {
        FacilityListing::Flat(list) => list,
        other => panic!("expected flat listing, got {:?}", other),
    };
    let ids: Vec<_> = relevant.iter().map(|f| f.facility_id).collect();
    assert_eq!(ids, vec![ramp, changing]);

    let non_relevant = match fx.engine.listing(space, Relevance::NonRelevant, false).await.unwrap() {
        FacilityListing::Flat(list) => list,
        other => panic!("expected flat listing, got {:?}", other),
    };
    let ids: Vec<_> = non_relevant.iter().map(|f| f.facility_id).collect();
    assert_eq!(ids, vec![pool_lift, door]);

    let groups = match fx.engine.listing(space, Relevance::Relevant, true).await.unwrap() {
        FacilityListing::Grouped(groups) => groups,
        other => panic!("expected grouped listing, got {:?}", other),
    };
    assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![entrance.id, toilets.id]);
    assert_eq!(groups[&entrance.id].facilities[0].id, ramp);
    assert_eq!(groups[&toilets.id].facilities[0].experience, Experience::Likely);
}

#[tokio::test]
async fn test_rank_prefers_likely_over_impossible() {
    let fx = setup().await;
    let ramp = fx.facility("Ramp", &[], &[]).await;
    let x = fx.space("X", &[]).await;
    let y = fx.space("Y", &[]).await;
    let z = fx.space("Z", &[]).await;
    fx.reviews(x, ramp, &[WasAllowed]).await;
    fx.reviews(y, ramp, &[WasNotAvailable]).await;
    fx.engine.recompute_all().await.unwrap();

    let filter = FacilityFilter::new([ramp]);
    let ranked = fx
        .engine
        .filter_and_rank(&SpaceQuery::all(), &filter)
        .await
        .unwrap();
    let ids: Vec<_> = ranked.iter().map(|p| p.space.id).collect();
    // z has only an unknown, atypical ramp and drops out
    assert_eq!(ids, vec![x, y]);

    let scored = fx.engine.rank(&SpaceQuery::all(), &filter).await.unwrap();
    let scores: Vec<_> = scored.iter().map(|s| (s.space.space.id, s.score)).collect();
    assert_eq!(scores, vec![(x, -2), (y, 2)]);

    assert_eq!(fx.engine.score(x, &filter).await.unwrap(), -2);
    assert_eq!(fx.engine.score(z, &filter).await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_filter_returns_every_candidate() {
    let fx = setup().await;
    fx.facility("Ramp", &[], &[]).await;
    let a = fx.space("A", &[]).await;
    let b = fx.space("B", &[]).await;

    let ranked = fx
        .engine
        .filter_and_rank(&SpaceQuery::all(), &FacilityFilter::default())
        .await
        .unwrap();
    let ids: Vec<_> = ranked.iter().map(|p| p.space.id).collect();
    assert_eq!(ids, vec![a, b]);
}

#[tokio::test]
async fn test_space_query_filters_by_space_type() {
    let fx = setup().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let library = insert_space_type(&mut conn, "Library").await.unwrap();
    let museum = insert_space_type(&mut conn, "Museum").await.unwrap();
    drop(conn);

    let a = fx.space("A", &[library.id]).await;
    fx.space("B", &[museum.id]).await;
    let c = fx.space("C", &[museum.id, library.id]).await;

    let profiles = fx
        .store()
        .space_profiles(&SpaceQuery::with_space_types(vec![library.id]))
        .await
        .unwrap();
    let ids: Vec<_> = profiles.iter().map(|p| p.space.id).collect();
    assert_eq!(ids, vec![a, c]);
}

#[tokio::test]
async fn test_import_catalog() {
    let fx = setup().await;
    let catalog: CatalogFile = toml::from_str(
        r#"
        [[category]]
        title = "Entrance"

        [[space_type]]
        title = "Library"

        [[facility]]
        title = "Ramp"
        categories = ["Entrance"]
        space_types = ["Library"]

        [[facility]]
        title = "Hearing loop"
        "#,
    )
    .unwrap();

    let summary = import_catalog(&fx.pool, &catalog).await.unwrap();
    assert_eq!(summary.facilities, 2);

    let facilities = fx.store().known_facilities().await.unwrap();
    let titles: Vec<_> = facilities.iter().map(|f| f.title.as_str()).collect();
    assert_eq!(titles, vec!["Ramp", "Hearing loop"]);

    let categories = fx.store().categories_for_facility(facilities[0].id).await.unwrap();
    assert_eq!(categories[0].title, "Entrance");
    assert_eq!(fx.store().space_types_for_facility(facilities[0].id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_catalog_rejects_unknown_reference() {
    let fx = setup().await;
    let catalog: CatalogFile = toml::from_str(
        r#"
        [[facility]]
        title = "Ramp"
        categories = ["Entrance"]
        "#,
    )
    .unwrap();

    let result = import_catalog(&fx.pool, &catalog).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(fx.store().known_facilities().await.unwrap().is_empty());
}
