//! Projection of the filtered results onto the map surface.

use encargo_core::{Coordinates, ListingId, ServiceListing};
use encargo_geo::LocationSource;
use serde::Serialize;

use crate::selection::{FlyToRequest, SelectionCoordinator};

pub const DEFAULT_ZOOM: f32 = 12.0;
pub const FLY_TO_ZOOM: f32 = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub listing_id: ListingId,
    pub coordinates: Coordinates,
    pub title: String,
    pub budget_label: String,
    pub urgent: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMarker {
    pub coordinates: Coordinates,
    pub source: LocationSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub style_url: String,
    pub center: Coordinates,
    pub zoom: f32,
    pub fly_to_zoom: f32,
    pub markers: Vec<MapMarker>,
    /// Results that stay in the list but have no place on the map.
    pub unplaced: Vec<ListingId>,
    pub user: UserMarker,
    pub selected: Option<ListingId>,
    pub fly_to: Option<FlyToRequest>,
    pub visible: bool,
    pub mounted: bool,
}

pub fn build_map_view(
    results: &[&ServiceListing],
    user: UserMarker,
    selection: &SelectionCoordinator,
    style_url: &str,
) -> MapView {
    let selected = selection.selected_id();
    let mut markers = Vec::with_capacity(results.len());
    let mut unplaced = Vec::new();
    for listing in results {
        match listing.coordinates {
            Some(coordinates) => markers.push(MapMarker {
                listing_id: listing.id,
                coordinates,
                title: listing.title.clone(),
                budget_label: listing.budget_label(),
                urgent: listing.urgent,
                selected: selected == Some(listing.id),
            }),
            None => unplaced.push(listing.id),
        }
    }

    MapView {
        style_url: style_url.to_string(),
        center: user.coordinates,
        zoom: DEFAULT_ZOOM,
        fly_to_zoom: FLY_TO_ZOOM,
        markers,
        unplaced,
        user,
        selected,
        fly_to: selection.fly_to().cloned(),
        visible: selection.map_visible(),
        mounted: selection.map_mounted(),
    }
}
