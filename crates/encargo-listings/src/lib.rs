//! Listing source contracts + fixture-backed implementations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encargo_core::{ListingId, ServiceListing};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "encargo-listings";

const SAMPLE_BUNDLE_JSON: &str = include_str!("../../../fixtures/listings/sample/bundle.json");

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0}")]
    Message(String),
    #[error("duplicate listing id {0}")]
    DuplicateId(ListingId),
    #[error("listing {id} is invalid: {reason}")]
    InvalidListing { id: ListingId, reason: String },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Where the browse view gets its raw collection from. Today every source is
/// fixture-backed; a network source would implement the same contract.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_listings(&self) -> Result<Vec<ServiceListing>, SourceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub fixture_id: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    pub listings: Vec<ServiceListing>,
}

pub fn parse_fixture_bundle(json: &str) -> Result<FixtureBundle, SourceError> {
    let bundle: FixtureBundle =
        serde_json::from_str(json).context("parsing listing fixture bundle")?;
    validate_bundle(&bundle)?;
    Ok(bundle)
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle, SourceError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_fixture_bundle(&data)
}

/// The embedded ten-listing catalogue the browse view ships with.
pub fn sample_bundle() -> Result<FixtureBundle, SourceError> {
    parse_fixture_bundle(SAMPLE_BUNDLE_JSON)
}

pub fn default_fixture_path(workspace_root: &Path) -> PathBuf {
    workspace_root
        .join("fixtures")
        .join("listings")
        .join("sample")
        .join("bundle.json")
}

pub fn validate_bundle(bundle: &FixtureBundle) -> Result<(), SourceError> {
    let mut seen = HashSet::with_capacity(bundle.listings.len());
    for listing in &bundle.listings {
        if !seen.insert(listing.id) {
            return Err(SourceError::DuplicateId(listing.id));
        }
        if listing.title.trim().is_empty() {
            return Err(SourceError::InvalidListing {
                id: listing.id,
                reason: "title is blank".to_string(),
            });
        }
        if !(0.0..=5.0).contains(&listing.posted_by.rating) {
            return Err(SourceError::InvalidListing {
                id: listing.id,
                reason: format!("rating {} outside 0..=5", listing.posted_by.rating),
            });
        }
        if let Some(coords) = &listing.coordinates {
            if !coords.is_valid() {
                return Err(SourceError::InvalidListing {
                    id: listing.id,
                    reason: "coordinates out of range".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Reads a bundle from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FixtureListingSource {
    path: PathBuf,
}

impl FixtureListingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

}

#[async_trait]
impl ListingSource for FixtureListingSource {
    fn source_id(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_listings(&self) -> Result<Vec<ServiceListing>, SourceError> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let bundle = parse_fixture_bundle(&data)?;
        debug!(
            fixture_id = %bundle.fixture_id,
            listings = bundle.listings.len(),
            path = %self.path.display(),
            "loaded listing fixture"
        );
        Ok(bundle.listings)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticListingSource {
    listings: Vec<ServiceListing>,
}

impl StaticListingSource {
    pub fn new(listings: Vec<ServiceListing>) -> Self {
        Self { listings }
    }

    pub fn sample() -> Result<Self, SourceError> {
        Ok(Self::new(sample_bundle()?.listings))
    }
}

#[async_trait]
impl ListingSource for StaticListingSource {
    fn source_id(&self) -> &'static str {
        "static"
    }

    async fn fetch_listings(&self) -> Result<Vec<ServiceListing>, SourceError> {
        Ok(self.listings.clone())
    }
}

/// Resolves a configured source name. `sample` is the embedded catalogue,
/// `fixture` reads the sample bundle from the workspace on each fetch.
pub fn listing_source_for(
    source_id: &str,
    workspace_root: &Path,
) -> Result<Option<Box<dyn ListingSource>>, SourceError> {
    let source: Box<dyn ListingSource> = match source_id {
        "sample" | "static" => Box::new(StaticListingSource::sample()?),
        "fixture" => Box::new(FixtureListingSource::new(default_fixture_path(workspace_root))),
        _ => return Ok(None),
    };
    Ok(Some(source))
}
