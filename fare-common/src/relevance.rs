//! Relevance classification
//!
//! Decides which facilities are worth showing for a space. A facility is
//! relevant when it is typical for one of the space's declared types, or when
//! its consensus says something informative (anything but `Unknown` or
//! `Impossible`). Non-relevance is its own predicate and is evaluated
//! independently; callers must not derive one list from the other.

use crate::experience::Experience;
use crate::models::{
    CategoryId, FacilityCategory, FacilityId, SpaceFacility, SpaceProfile, SpaceTypeId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which side of the classification to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Relevant,
    NonRelevant,
}

/// Facility entry inside a category group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub id: FacilityId,
    pub title: String,
    pub description: Option<String>,
    pub experience: Experience,
    pub space_type_ids: Vec<SpaceTypeId>,
}

impl From<&SpaceFacility> for FacilitySummary {
    fn from(facility: &SpaceFacility) -> Self {
        Self {
            id: facility.facility_id,
            title: facility.title.clone(),
            description: facility.description.clone(),
            experience: facility.experience,
            space_type_ids: facility.space_type_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: FacilityCategory,
    pub facilities: Vec<FacilitySummary>,
}

/// Facilities grouped by category, ascending category id
pub type CategoryGroups = BTreeMap<CategoryId, CategoryGroup>;

/// Per-category listing entry, independent of relevance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub title: String,
    pub icon: Option<String>,
    pub experience: Experience,
}

/// Facility is declared typical for at least one of the space's types
fn is_typical(facility: &SpaceFacility, space_type_ids: &[SpaceTypeId]) -> bool {
    facility
        .space_type_ids
        .iter()
        .any(|id| space_type_ids.contains(id))
}

pub fn is_relevant(facility: &SpaceFacility, space_type_ids: &[SpaceTypeId]) -> bool {
    is_typical(facility, space_type_ids)
        || !(facility.experience.is_unknown() || facility.experience.is_impossible())
}

pub fn is_non_relevant(facility: &SpaceFacility, space_type_ids: &[SpaceTypeId]) -> bool {
    !is_typical(facility, space_type_ids)
        && (facility.experience.is_unknown() || facility.experience.is_impossible())
}

fn on_side(facility: &SpaceFacility, profile: &SpaceProfile, relevance: Relevance) -> bool {
    let space_types = &profile.space.space_type_ids;
    match relevance {
        Relevance::Relevant => is_relevant(facility, space_types),
        Relevance::NonRelevant => is_non_relevant(facility, space_types),
    }
}

/// Facilities on one side of the classification, in profile order
pub fn classify(profile: &SpaceProfile, relevance: Relevance) -> Vec<&SpaceFacility> {
    profile
        .facilities
        .iter()
        .filter(|facility| on_side(facility, profile, relevance))
        .collect()
}

pub fn relevant(profile: &SpaceProfile) -> Vec<&SpaceFacility> {
    classify(profile, Relevance::Relevant)
}

pub fn non_relevant(profile: &SpaceProfile) -> Vec<&SpaceFacility> {
    classify(profile, Relevance::NonRelevant)
}

/// Group one side of the classification by category
///
/// A facility with several categories is listed under each of them.
pub fn classify_by_category(profile: &SpaceProfile, relevance: Relevance) -> CategoryGroups {
    let mut groups = CategoryGroups::new();

    for facility in classify(profile, relevance) {
        for category in &facility.categories {
            groups
                .entry(category.id)
                .or_insert_with(|| CategoryGroup {
                    category: category.clone(),
                    facilities: Vec::new(),
                })
                .facilities
                .push(FacilitySummary::from(facility));
        }
    }

    groups
}

pub fn relevant_by_category(profile: &SpaceProfile) -> CategoryGroups {
    classify_by_category(profile, Relevance::Relevant)
}

pub fn non_relevant_by_category(profile: &SpaceProfile) -> CategoryGroups {
    classify_by_category(profile, Relevance::NonRelevant)
}

/// Every facility of a category at this space, relevant or not
pub fn facilities_in_category(profile: &SpaceProfile, category_id: CategoryId) -> Vec<CategoryEntry> {
    profile
        .facilities
        .iter()
        .filter(|facility| facility.categories.iter().any(|c| c.id == category_id))
        .map(|facility| CategoryEntry {
            title: facility.title.clone(),
            icon: facility.icon.clone(),
            experience: facility.experience,
        })
        .collect()
}

/// Consensus experience of one facility at this space
pub fn experience_for(profile: &SpaceProfile, facility_id: FacilityId) -> Option<Experience> {
    profile
        .facilities
        .iter()
        .find(|facility| facility.facility_id == facility_id)
        .map(|facility| facility.experience)
}
