//! Facility catalog maintenance
//!
//! The catalog (categories, space types, facilities and their links) is
//! normally curated by the web application. These helpers let operators and
//! tests load it directly, either record by record or from a TOML file:
//!
//! ```toml
//! [[category]]
//! title = "Entrance"
//!
//! [[space_type]]
//! title = "Library"
//!
//! [[facility]]
//! title = "Step-free entrance"
//! icon = "ramp"
//! categories = ["Entrance"]
//! space_types = ["Library"]
//! ```

use crate::models::{CategoryId, Facility, FacilityCategory, SpaceType, SpaceTypeId};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Facility to be added to the catalog
#[derive(Debug, Clone, Default)]
pub struct NewFacility {
    pub title: String,
    pub icon: Option<String>,
    pub category_ids: Vec<CategoryId>,
    pub space_type_ids: Vec<SpaceTypeId>,
}

pub async fn insert_category(conn: &mut SqliteConnection, title: &str) -> Result<FacilityCategory> {
    let id = sqlx::query_scalar("INSERT INTO facility_categories (title) VALUES (?) RETURNING id")
        .bind(title)
        .fetch_one(&mut *conn)
        .await?;
    Ok(FacilityCategory {
        id,
        title: title.to_string(),
    })
}

pub async fn insert_space_type(conn: &mut SqliteConnection, title: &str) -> Result<SpaceType> {
    let id = sqlx::query_scalar("INSERT INTO space_types (title) VALUES (?) RETURNING id")
        .bind(title)
        .fetch_one(&mut *conn)
        .await?;
    Ok(SpaceType {
        id,
        title: title.to_string(),
    })
}

/// Insert a facility with its category and space type links
pub async fn insert_facility(conn: &mut SqliteConnection, facility: &NewFacility) -> Result<Facility> {
    let (id, created_at): (i64, NaiveDateTime) = sqlx::query_as(
        "INSERT INTO facilities (title, icon) VALUES (?, ?) RETURNING id, created_at",
    )
    .bind(&facility.title)
    .bind(&facility.icon)
    .fetch_one(&mut *conn)
    .await?;

    for category_id in &facility.category_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO facility_category_memberships (facility_id, category_id) VALUES (?, ?)",
        )
        .bind(id)
        .bind(category_id)
        .execute(&mut *conn)
        .await?;
    }

    for space_type_id in &facility.space_type_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO facility_space_types (facility_id, space_type_id) VALUES (?, ?)",
        )
        .bind(id)
        .bind(space_type_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(Facility {
        id,
        title: facility.title.clone(),
        icon: facility.icon.clone(),
        created_at: created_at.and_utc(),
    })
}

/// Catalog file layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryRecord>,
    #[serde(default, rename = "space_type")]
    pub space_types: Vec<SpaceTypeRecord>,
    #[serde(default, rename = "facility")]
    pub facilities: Vec<FacilityRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRecord {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceTypeRecord {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacilityRecord {
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Category titles
    #[serde(default)]
    pub categories: Vec<String>,
    /// Space type titles
    #[serde(default)]
    pub space_types: Vec<String>,
}

/// Counts of records created by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogImport {
    pub categories: usize,
    pub space_types: usize,
    pub facilities: usize,
}

impl CatalogFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse catalog {} failed: {}", path.display(), e)))
    }
}

fn resolve(titles: &[String], ids: &HashMap<String, i64>, kind: &str, facility: &str) -> Result<Vec<i64>> {
    titles
        .iter()
        .map(|title| {
            ids.get(title).copied().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "facility '{}' references unknown {} '{}'",
                    facility, kind, title
                ))
            })
        })
        .collect()
}

/// Import a catalog file in one transaction
///
/// Facilities are inserted in file order, which becomes their catalog order.
/// Titles referenced by facilities must be declared in the same file.
pub async fn import_catalog(pool: &SqlitePool, catalog: &CatalogFile) -> Result<CatalogImport> {
    let mut tx = pool.begin().await?;

    let mut category_ids = HashMap::new();
    for entry in &catalog.categories {
        let category = insert_category(&mut tx, &entry.title).await?;
        category_ids.insert(category.title, category.id);
    }

    let mut space_type_ids = HashMap::new();
    for entry in &catalog.space_types {
        let space_type = insert_space_type(&mut tx, &entry.title).await?;
        space_type_ids.insert(space_type.title, space_type.id);
    }

    for entry in &catalog.facilities {
        let facility = NewFacility {
            title: entry.title.clone(),
            icon: entry.icon.clone(),
            category_ids: resolve(&entry.categories, &category_ids, "category", &entry.title)?,
            space_type_ids: resolve(&entry.space_types, &space_type_ids, "space type", &entry.title)?,
        };
        insert_facility(&mut tx, &facility).await?;
    }

    tx.commit().await?;

    let summary = CatalogImport {
        categories: catalog.categories.len(),
        space_types: catalog.space_types.len(),
        facilities: catalog.facilities.len(),
    };
    info!(
        "Imported catalog: {} categories, {} space types, {} facilities",
        summary.categories, summary.space_types, summary.facilities
    );
    Ok(summary)
}
