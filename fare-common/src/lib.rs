//! # FARE Common Library
//!
//! Facility experience aggregation and relevance engine:
//! - Consensus state machine over raw facility reviews
//! - Aggregation runner persisting one consensus row per (space, facility)
//! - Relevance classification of a space's facilities
//! - Filter-and-rank scoring of spaces against desired facilities
//! - SQLite storage and configuration loading

pub mod aggregation;
pub mod config;
pub mod consensus;
pub mod db;
pub mod engine;
pub mod error;
pub mod experience;
pub mod models;
pub mod relevance;
pub mod scoring;
pub mod store;

pub use engine::{FacilityEngine, FacilityListing};
pub use error::{Error, Result};
pub use experience::Experience;
