//! fare-admin - Operator tool for the facility aggregation engine
//!
//! Initializes the database, loads the facility catalog, repairs consensus
//! rows, and prints relevance listings and rankings as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fare_common::config::{config_file_path, load_config, resolve_database_path};
use fare_common::db::{import_catalog, init_database, CatalogFile, SqliteStore};
use fare_common::experience::ReviewExperience;
use fare_common::models::{NewFacilityReview, NewSpace};
use fare_common::relevance::Relevance;
use fare_common::scoring::FacilityFilter;
use fare_common::store::SpaceQuery;
use fare_common::FacilityEngine;

#[derive(Parser, Debug)]
#[command(name = "fare-admin")]
#[command(about = "Facility experience aggregation and relevance tool")]
#[command(version)]
struct Cli {
    /// Config file (default: <config_dir>/fare/config.toml, or FARE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides FARE_DATABASE and the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and its tables
    Init,

    /// Load categories, space types, and facilities from a TOML file
    ImportCatalog {
        file: PathBuf,
    },

    /// Create a space and give it one unknown row per facility
    AddSpace {
        #[arg(long)]
        title: String,

        #[arg(long = "space-type")]
        space_types: Vec<i64>,
    },

    /// Record a review and refresh the space's consensus
    Review {
        #[arg(long)]
        space: i64,

        #[arg(long)]
        facility: i64,

        #[arg(long)]
        user: i64,

        /// was_allowed, was_allowed_but_bad, was_not_allowed, was_not_available
        #[arg(long)]
        experience: ReviewExperience,
    },

    /// Delete a review and refresh the space's consensus
    RemoveReview {
        #[arg(long)]
        review: i64,
    },

    /// Recompute the consensus rows of one space
    Recompute {
        #[arg(long)]
        space: i64,
    },

    /// Recompute every space
    RecomputeAll,

    /// List a space's relevant (or non-relevant) facilities
    Relevant {
        #[arg(long)]
        space: i64,

        #[arg(long)]
        non_relevant: bool,

        /// Group by facility category
        #[arg(long)]
        grouped: bool,
    },

    /// List every facility of one category at a space
    Category {
        #[arg(long)]
        space: i64,

        #[arg(long)]
        category: i64,
    },

    /// Show the consensus experience of one facility at a space
    Experience {
        #[arg(long)]
        space: i64,

        #[arg(long)]
        facility: i64,
    },

    /// Rank spaces against desired facilities
    Rank {
        /// Comma-separated facility ids
        #[arg(long, default_value = "")]
        facilities: String,

        /// Only spaces declaring one of these space types
        #[arg(long = "space-type")]
        space_types: Vec<i64>,
    },

    /// Score one space against desired facilities
    Score {
        #[arg(long)]
        space: i64,

        #[arg(long)]
        facilities: String,
    },
}

/// Malformed filters degrade to no filter
fn parse_filter(text: &str) -> FacilityFilter {
    text.parse().unwrap_or_else(|e| {
        warn!("{}; ignoring facility filter", e);
        FacilityFilter::default()
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = config_file_path(cli.config.as_deref());
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;

    // stdout carries JSON output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting fare-admin v{}", env!("CARGO_PKG_VERSION"));

    let db_path = resolve_database_path(cli.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path, &config.database())
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let engine = FacilityEngine::new(Arc::new(SqliteStore::new(pool.clone())));

    match cli.command {
        Command::Init => {
            info!("Database initialized");
        }
        Command::ImportCatalog { file } => {
            let catalog = CatalogFile::load(&file)?;
            let summary = import_catalog(&pool, &catalog).await?;
            let spaces = engine.recompute_all().await?;
            info!(
                "Imported {} facilities, recomputed {} spaces",
                summary.facilities, spaces
            );
        }
        Command::AddSpace { title, space_types } => {
            let (space, rows) = engine
                .register_space(&NewSpace {
                    title,
                    space_type_ids: space_types,
                })
                .await?;
            info!("Space {} has {} facility rows", space.id, rows.len());
            print_json(&space)?;
        }
        Command::Review {
            space,
            facility,
            user,
            experience,
        } => {
            let (review, rows) = engine
                .submit_review(&NewFacilityReview {
                    space_id: space,
                    facility_id: facility,
                    user_id: user,
                    experience,
                })
                .await?;
            info!("Stored review {}", review.id);
            print_json(&rows)?;
        }
        Command::RemoveReview { review } => {
            let (removed, rows) = engine.remove_review(review).await?;
            info!("Removed review {} from space {}", removed.id, removed.space_id);
            print_json(&rows)?;
        }
        Command::Recompute { space } => {
            let rows = engine.recompute(space).await?;
            print_json(&rows)?;
        }
        Command::RecomputeAll => {
            let count = engine.recompute_all().await?;
            info!("Recomputed {} spaces", count);
        }
        Command::Relevant {
            space,
            non_relevant,
            grouped,
        } => {
            let relevance = if non_relevant {
                Relevance::NonRelevant
            } else {
                Relevance::Relevant
            };
            let listing = engine.listing(space, relevance, grouped).await?;
            print_json(&listing)?;
        }
        Command::Category { space, category } => {
            let entries = engine.category_listing(space, category).await?;
            print_json(&entries)?;
        }
        Command::Experience { space, facility } => {
            let experience = engine.experience(space, facility).await?;
            print_json(&serde_json::json!({
                "space_id": space,
                "facility_id": facility,
                "experience": experience,
            }))?;
        }
        Command::Rank {
            facilities,
            space_types,
        } => {
            let filter = parse_filter(&facilities);
            let ranked = engine
                .rank(&SpaceQuery::with_space_types(space_types), &filter)
                .await?;
            print_json(&ranked)?;
        }
        Command::Score { space, facilities } => {
            let filter = parse_filter(&facilities);
            let score = engine.score(space, &filter).await?;
            print_json(&serde_json::json!({ "space_id": space, "score": score }))?;
        }
    }

    pool.close().await;
    Ok(())
}
