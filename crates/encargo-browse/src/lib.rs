//! Faceted search and selection engine behind the browse-services view.

use encargo_core::{Coordinates, ListingId, ServiceListing, SANTIAGO_CENTER};
use encargo_geo::{LocationStatus, LocationTracker};
use serde::Serialize;
use thiserror::Error;

pub mod filter;
pub mod map;
pub mod selection;

pub use filter::{
    active_filter_count, category_facets, filter_listings, location_facets, sort_listings,
    CategoryFilter, Distance, FacetCount, FilterState, FilterUpdate, LocationFilter, PriceRange,
    SortOrder, WorkType, ALL_CATEGORIES_LABEL, ALL_LOCATIONS_LABEL, ANY_PRICE_LABEL,
};
pub use map::{build_map_view, MapMarker, MapView, UserMarker};
pub use selection::{
    DetailPhase, FlyToRequest, Presentation, SelectionCoordinator, SelectionEffect, Viewport,
};

pub const CRATE_NAME: &str = "encargo-browse";

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("listing {0} not found")]
    UnknownListing(ListingId),
}

/// State holder owned by the top-level browse view and lent to its renderers.
/// Created with defaults on mount and dropped on unmount.
#[derive(Debug, Clone)]
pub struct BrowseView {
    pub filters: FilterState,
    pub selection: SelectionCoordinator,
    pub location: LocationTracker,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub phase: DetailPhase,
    pub presentation: Presentation,
    pub viewport: Viewport,
    pub selected: Option<ListingId>,
    pub active_filter_count: usize,
    pub result_count: usize,
    pub location: LocationStatus,
    pub location_message: String,
}

impl BrowseView {
    pub fn new(viewport: Viewport) -> Self {
        Self::with_default_location(viewport, SANTIAGO_CENTER)
    }

    pub fn with_default_location(viewport: Viewport, default_location: Coordinates) -> Self {
        let mut selection = SelectionCoordinator::new(viewport);
        selection.mount_map();
        Self {
            filters: FilterState::default(),
            selection,
            location: LocationTracker::new(default_location),
        }
    }

    /// Filtered, then ordered by the chosen sort.
    pub fn results<'a>(&self, catalog: &'a [ServiceListing]) -> Vec<&'a ServiceListing> {
        let mut results = filter_listings(catalog, &self.filters);
        sort_listings(&mut results, self.filters.sort_by);
        results
    }

    pub fn active_filter_count(&self) -> usize {
        active_filter_count(&self.filters)
    }

    pub fn select_by_id(
        &mut self,
        catalog: &[ServiceListing],
        id: ListingId,
    ) -> Result<SelectionEffect, BrowseError> {
        let listing = catalog
            .iter()
            .find(|l| l.id == id)
            .ok_or(BrowseError::UnknownListing(id))?;
        Ok(self.selection.select(listing.clone()))
    }

    pub fn map_view(&self, catalog: &[ServiceListing], style_url: &str) -> MapView {
        let results = self.results(catalog);
        let user = UserMarker {
            coordinates: self.location.current(),
            source: self.location.source(),
        };
        build_map_view(&results, user, &self.selection, style_url)
    }

    pub fn snapshot(&self, catalog: &[ServiceListing]) -> ViewSnapshot {
        let status = self.location.status().clone();
        ViewSnapshot {
            phase: self.selection.phase(),
            presentation: self.selection.presentation(),
            viewport: self.selection.viewport(),
            selected: self.selection.selected_id(),
            active_filter_count: self.active_filter_count(),
            result_count: self.results(catalog).len(),
            location_message: status.message(),
            location: status,
        }
    }
}
