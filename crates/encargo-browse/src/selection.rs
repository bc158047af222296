//! Single selected listing shared by the list, the map and the detail panel.

use encargo_core::{Coordinates, ListingId, ServiceListing};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewport {
    #[default]
    Desktop,
    Mobile,
}

impl Viewport {
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "desktop" => Some(Self::Desktop),
            "mobile" => Some(Self::Mobile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailPhase {
    Browsing,
    DetailOpen,
    /// Detail still on screen while its exit transition runs.
    Exiting,
}

/// What the top-level view shows in the detail slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    Map,
    SidePanel,
    List,
    Sheet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlyToRequest {
    pub listing_id: ListingId,
    pub coordinates: Coordinates,
    /// Strictly increasing, so the same target can be requested twice.
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEffect {
    EnterDetail(ListingId),
    SwapDetail(ListingId),
    ExitDetail,
    FlyTo(FlyToRequest),
    ShowMap,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct SelectionCoordinator {
    viewport: Viewport,
    phase: DetailPhase,
    selected: Option<ServiceListing>,
    fly_to: Option<FlyToRequest>,
    last_token: u64,
    map_mounted: bool,
}

impl SelectionCoordinator {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            phase: DetailPhase::Browsing,
            selected: None,
            fly_to: None,
            last_token: 0,
            map_mounted: false,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn phase(&self) -> DetailPhase {
        self.phase
    }

    pub fn selected(&self) -> Option<&ServiceListing> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<ListingId> {
        self.selected.as_ref().map(|l| l.id)
    }

    pub fn fly_to(&self) -> Option<&FlyToRequest> {
        self.fly_to.as_ref()
    }

    pub fn detail_visible(&self) -> bool {
        self.phase != DetailPhase::Browsing
    }

    pub fn presentation(&self) -> Presentation {
        match (self.viewport, self.detail_visible()) {
            (Viewport::Desktop, false) => Presentation::Map,
            (Viewport::Desktop, true) => Presentation::SidePanel,
            (Viewport::Mobile, false) => Presentation::List,
            (Viewport::Mobile, true) => Presentation::Sheet,
        }
    }

    /// Once mounted the map stays mounted; hiding it is a presentation concern.
    pub fn mount_map(&mut self) {
        self.map_mounted = true;
    }

    pub fn map_mounted(&self) -> bool {
        self.map_mounted
    }

    pub fn map_visible(&self) -> bool {
        self.map_mounted && matches!(self.presentation(), Presentation::Map | Presentation::List)
    }

    /// A selection while the previous detail is exiting cancels the exit.
    pub fn select(&mut self, listing: ServiceListing) -> SelectionEffect {
        let id = listing.id;
        let effect = match self.phase {
            DetailPhase::DetailOpen => SelectionEffect::SwapDetail(id),
            DetailPhase::Browsing | DetailPhase::Exiting => SelectionEffect::EnterDetail(id),
        };
        debug!(listing_id = %id, from = ?self.phase, "listing selected");
        self.selected = Some(listing);
        self.phase = DetailPhase::DetailOpen;
        effect
    }

    pub fn view_on_map(&mut self) -> SelectionEffect {
        if self.phase != DetailPhase::DetailOpen {
            return SelectionEffect::Ignored;
        }
        self.phase = DetailPhase::Browsing;
        let Some(listing) = &self.selected else {
            return SelectionEffect::ShowMap;
        };
        let Some(coordinates) = listing.coordinates else {
            return SelectionEffect::ShowMap;
        };
        self.last_token += 1;
        let request = FlyToRequest {
            listing_id: listing.id,
            coordinates,
            token: self.last_token,
        };
        debug!(listing_id = %request.listing_id, token = request.token, "fly-to requested");
        self.fly_to = Some(request.clone());
        SelectionEffect::FlyTo(request)
    }

    /// Starts the exit transition. Repeated dismissals while exiting are ignored.
    pub fn dismiss(&mut self) -> SelectionEffect {
        if self.phase != DetailPhase::DetailOpen {
            return SelectionEffect::Ignored;
        }
        self.phase = DetailPhase::Exiting;
        SelectionEffect::ExitDetail
    }

    /// Called when the exit transition has finished.
    pub fn complete_exit(&mut self) -> SelectionEffect {
        if self.phase != DetailPhase::Exiting {
            return SelectionEffect::Ignored;
        }
        self.phase = DetailPhase::Browsing;
        self.selected = None;
        debug!("detail closed");
        SelectionEffect::ShowMap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: u32) -> ServiceListing {
        encargo_listings::sample_bundle()
            .unwrap()
            .listings
            .into_iter()
            .find(|l| l.id == ListingId(id))
            .unwrap()
    }

    #[test]
    fn select_then_dismiss_returns_to_browsing() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        coord.mount_map();
        assert_eq!(coord.select(listing(1)), SelectionEffect::EnterDetail(ListingId(1)));
        assert_eq!(coord.presentation(), Presentation::SidePanel);
        assert!(!coord.map_visible());
        assert!(coord.map_mounted());

        assert_eq!(coord.dismiss(), SelectionEffect::ExitDetail);
        assert_eq!(coord.phase(), DetailPhase::Exiting);
        assert_eq!(coord.selected_id(), Some(ListingId(1)));

        assert_eq!(coord.complete_exit(), SelectionEffect::ShowMap);
        assert_eq!(coord.phase(), DetailPhase::Browsing);
        assert!(coord.selected().is_none());
        assert!(coord.map_visible());
    }

    #[test]
    fn reselecting_keeps_detail_open() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        coord.select(listing(1));
        assert_eq!(coord.select(listing(5)), SelectionEffect::SwapDetail(ListingId(5)));
        assert_eq!(coord.phase(), DetailPhase::DetailOpen);
        assert_eq!(coord.selected_id(), Some(ListingId(5)));
    }

    #[test]
    fn second_dismiss_while_exiting_is_ignored() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        coord.select(listing(2));
        coord.dismiss();
        assert_eq!(coord.dismiss(), SelectionEffect::Ignored);
        assert_eq!(coord.phase(), DetailPhase::Exiting);
        assert_eq!(coord.complete_exit(), SelectionEffect::ShowMap);
        assert_eq!(coord.complete_exit(), SelectionEffect::Ignored);
    }

    #[test]
    fn selecting_during_exit_cancels_it() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        coord.select(listing(2));
        coord.dismiss();
        assert_eq!(coord.select(listing(3)), SelectionEffect::EnterDetail(ListingId(3)));
        assert_eq!(coord.phase(), DetailPhase::DetailOpen);
        // the stale completion callback must not clear the new selection
        assert_eq!(coord.complete_exit(), SelectionEffect::Ignored);
        assert_eq!(coord.selected_id(), Some(ListingId(3)));
    }

    #[test]
    fn view_on_map_issues_increasing_tokens_for_same_listing() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        coord.mount_map();
        coord.select(listing(7));
        let SelectionEffect::FlyTo(first) = coord.view_on_map() else {
            panic!("expected fly-to");
        };
        assert_eq!(coord.phase(), DetailPhase::Browsing);
        assert!(coord.map_visible());
        assert_eq!(coord.selected_id(), Some(ListingId(7)));

        assert_eq!(coord.view_on_map(), SelectionEffect::Ignored);

        coord.select(listing(7));
        let SelectionEffect::FlyTo(second) = coord.view_on_map() else {
            panic!("expected fly-to");
        };
        assert_eq!(first.coordinates, second.coordinates);
        assert!(second.token > first.token);
        assert_eq!(coord.fly_to(), Some(&second));
    }

    #[test]
    fn view_on_map_without_coordinates_just_shows_map() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        let mut unplaced = listing(4);
        unplaced.coordinates = None;
        coord.select(unplaced);
        assert_eq!(coord.view_on_map(), SelectionEffect::ShowMap);
        assert!(coord.fly_to().is_none());
    }

    #[test]
    fn mobile_uses_list_and_sheet() {
        let mut coord = SelectionCoordinator::new(Viewport::Mobile);
        coord.mount_map();
        assert_eq!(coord.presentation(), Presentation::List);
        coord.select(listing(1));
        assert_eq!(coord.presentation(), Presentation::Sheet);
        coord.dismiss();
        assert_eq!(coord.presentation(), Presentation::Sheet);
        coord.complete_exit();
        assert_eq!(coord.presentation(), Presentation::List);
    }

    #[test]
    fn dismiss_without_selection_is_ignored() {
        let mut coord = SelectionCoordinator::new(Viewport::Desktop);
        assert_eq!(coord.dismiss(), SelectionEffect::Ignored);
        assert_eq!(coord.view_on_map(), SelectionEffect::Ignored);
        assert_eq!(coord.phase(), DetailPhase::Browsing);
    }
}
