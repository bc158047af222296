//! Filter state, predicate composition and the active-filter badge.

use std::collections::BTreeMap;

use encargo_core::{Category, ServiceListing};
use serde::Serialize;

pub const ALL_CATEGORIES_LABEL: &str = "Todas las categorías";
pub const ALL_LOCATIONS_LABEL: &str = "Todas las ubicaciones";
pub const ANY_PRICE_LABEL: &str = "Cualquier precio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn from_label(label: &str) -> Option<Self> {
        if label == ALL_CATEGORIES_LABEL {
            return Some(Self::All);
        }
        Category::from_label(label).map(Self::Only)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => ALL_CATEGORIES_LABEL,
            Self::Only(category) => category.label(),
        }
    }

    pub fn options() -> Vec<&'static str> {
        std::iter::once(ALL_CATEGORIES_LABEL)
            .chain(Category::ALL.iter().map(|c| c.label()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LocationFilter {
    #[default]
    All,
    /// Matched by substring containment against the listing's location text.
    Named(String),
}

impl LocationFilter {
    /// An empty label is rejected: it would contain-match every listing.
    pub fn from_label(label: &str) -> Option<Self> {
        if label == ALL_LOCATIONS_LABEL {
            Some(Self::All)
        } else if label.is_empty() {
            None
        } else {
            Some(Self::Named(label.to_string()))
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::All => ALL_LOCATIONS_LABEL,
            Self::Named(name) => name,
        }
    }
}

/// Budget buckets: `<= 5000`, `(5000, 15000]`, `(15000, 30000]`, `> 30000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceRange {
    #[default]
    Any,
    UpTo5k,
    From5kTo15k,
    From15kTo30k,
    Over30k,
}

impl PriceRange {
    pub const ALL: [PriceRange; 5] = [
        PriceRange::Any,
        PriceRange::UpTo5k,
        PriceRange::From5kTo15k,
        PriceRange::From15kTo30k,
        PriceRange::Over30k,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Any => ANY_PRICE_LABEL,
            Self::UpTo5k => "Hasta $5.000",
            Self::From5kTo15k => "$5.000 - $15.000",
            Self::From15kTo30k => "$15.000 - $30.000",
            Self::Over30k => "Más de $30.000",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    pub fn contains(self, budget: u64) -> bool {
        match self {
            Self::Any => true,
            Self::UpTo5k => budget <= 5_000,
            Self::From5kTo15k => budget > 5_000 && budget <= 15_000,
            Self::From15kTo30k => budget > 15_000 && budget <= 30_000,
            Self::Over30k => budget > 30_000,
        }
    }
}

/// Declared sort orders. `filter_listings` never applies them; see `sort_listings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Recent,
    BudgetLowToHigh,
    BudgetHighToLow,
    FewestOffers,
}

impl SortOrder {
    pub const ALL: [SortOrder; 4] = [
        SortOrder::Recent,
        SortOrder::BudgetLowToHigh,
        SortOrder::BudgetHighToLow,
        SortOrder::FewestOffers,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Recent => "Más recientes",
            Self::BudgetLowToHigh => "Menor presupuesto",
            Self::BudgetHighToLow => "Mayor presupuesto",
            Self::FewestOffers => "Menos ofertas",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkType {
    #[default]
    All,
    InPerson,
    Remotely,
}

impl WorkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::InPerson => "in-person",
            Self::Remotely => "remotely",
        }
    }

    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "in-person" => Some(Self::InPerson),
            "remotely" => Some(Self::Remotely),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "Todos",
            Self::InPerson => "Presencial",
            Self::Remotely => "Remoto",
        }
    }
}

/// Search radius in kilometres, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance(u8);

impl Distance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 20;
    pub const DEFAULT: u8 = 10;

    pub fn new(km: i64) -> Self {
        Self(km.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8)
    }

    pub fn km(self) -> u8 {
        self.0
    }
}

impl Default for Distance {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub search_query: String,
    pub category: CategoryFilter,
    pub location: LocationFilter,
    pub price_range: PriceRange,
    pub sort_by: SortOrder,
    pub show_available_only: bool,
    pub show_no_offers_only: bool,
    pub work_type: WorkType,
    pub distance: Distance,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            category: CategoryFilter::All,
            location: LocationFilter::All,
            price_range: PriceRange::Any,
            sort_by: SortOrder::Recent,
            show_available_only: true,
            show_no_offers_only: false,
            work_type: WorkType::All,
            distance: Distance::default(),
        }
    }
}

/// One user interaction changes one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    SearchQuery(String),
    Category(CategoryFilter),
    Location(LocationFilter),
    PriceRange(PriceRange),
    SortBy(SortOrder),
    AvailableOnly(bool),
    NoOffersOnly(bool),
    WorkType(WorkType),
    Distance(Distance),
}

impl FilterState {
    pub fn apply(&mut self, update: FilterUpdate) {
        match update {
            FilterUpdate::SearchQuery(q) => self.search_query = q,
            FilterUpdate::Category(c) => self.category = c,
            FilterUpdate::Location(l) => self.location = l,
            FilterUpdate::PriceRange(p) => self.price_range = p,
            FilterUpdate::SortBy(s) => self.sort_by = s,
            FilterUpdate::AvailableOnly(v) => self.show_available_only = v,
            FilterUpdate::NoOffersOnly(v) => self.show_no_offers_only = v,
            FilterUpdate::WorkType(w) => self.work_type = w,
            FilterUpdate::Distance(d) => self.distance = d,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub fn matches_text(listing: &ServiceListing, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    listing.title.to_lowercase().contains(&needle)
        || listing.description.to_lowercase().contains(&needle)
}

pub fn matches_category(listing: &ServiceListing, filter: &CategoryFilter) -> bool {
    match filter {
        CategoryFilter::All => true,
        CategoryFilter::Only(category) => listing.category == *category,
    }
}

pub fn matches_location(listing: &ServiceListing, filter: &LocationFilter) -> bool {
    match filter {
        LocationFilter::All => true,
        LocationFilter::Named(name) => listing.location.contains(name.as_str()),
    }
}

pub fn matches_price(listing: &ServiceListing, range: PriceRange) -> bool {
    range.contains(listing.budget)
}

pub fn matches_availability(listing: &ServiceListing, available_only: bool) -> bool {
    !available_only || listing.is_open()
}

pub fn matches_no_offers(listing: &ServiceListing, no_offers_only: bool) -> bool {
    !no_offers_only || listing.offers == 0
}

/// Listings carry no work-type field yet, so every value passes.
pub fn matches_work_type(_listing: &ServiceListing, _work_type: WorkType) -> bool {
    true
}

pub fn matches(listing: &ServiceListing, filters: &FilterState) -> bool {
    matches_text(listing, &filters.search_query)
        && matches_category(listing, &filters.category)
        && matches_location(listing, &filters.location)
        && matches_price(listing, filters.price_range)
        && matches_availability(listing, filters.show_available_only)
        && matches_no_offers(listing, filters.show_no_offers_only)
        && matches_work_type(listing, filters.work_type)
}

/// Subset of `listings` satisfying every active constraint, in input order.
/// Distance and sort order are not applied here.
pub fn filter_listings<'a>(
    listings: &'a [ServiceListing],
    filters: &FilterState,
) -> Vec<&'a ServiceListing> {
    listings.iter().filter(|l| matches(l, filters)).collect()
}

pub fn active_filter_count(filters: &FilterState) -> usize {
    let defaults = FilterState::default();
    [
        filters.category != defaults.category,
        filters.location != defaults.location,
        filters.price_range != defaults.price_range,
        filters.show_no_offers_only,
        !filters.show_available_only,
        filters.work_type != WorkType::All,
        filters.distance != defaults.distance,
    ]
    .into_iter()
    .filter(|changed| *changed)
    .count()
}

/// Stable sort of an already filtered result set.
pub fn sort_listings(results: &mut [&ServiceListing], order: SortOrder) {
    match order {
        SortOrder::Recent => results.sort_by(|a, b| b.posted_at.cmp(&a.posted_at)),
        SortOrder::BudgetLowToHigh => results.sort_by_key(|l| l.budget),
        SortOrder::BudgetHighToLow => results.sort_by(|a, b| b.budget.cmp(&a.budget)),
        SortOrder::FewestOffers => results.sort_by_key(|l| l.offers),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub label: String,
    pub count: usize,
    pub selected: bool,
}

pub fn category_facets(listings: &[ServiceListing], filters: &FilterState) -> Vec<FacetCount> {
    let mut counts = BTreeMap::<Category, usize>::new();
    for listing in listings {
        *counts.entry(listing.category).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(category, count)| FacetCount {
            label: category.label().to_string(),
            count,
            selected: filters.category == CategoryFilter::Only(category),
        })
        .collect()
}

/// Commune name of a location string such as `"Ñuñoa, Santiago"`.
pub fn location_key(location: &str) -> &str {
    location.split(',').next().unwrap_or(location).trim()
}

pub fn location_facets(listings: &[ServiceListing], filters: &FilterState) -> Vec<FacetCount> {
    let mut counts = BTreeMap::<String, usize>::new();
    for listing in listings {
        *counts
            .entry(location_key(&listing.location).to_string())
            .or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(label, count)| FacetCount {
            selected: filters.location.label() == label,
            label,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use encargo_core::{Coordinates, ListingId, ListingStatus, ProviderId, PublicProfile};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn sample() -> Vec<ServiceListing> {
        encargo_listings::sample_bundle().unwrap().listings
    }

    fn ids(results: &[&ServiceListing]) -> Vec<u32> {
        results.iter().map(|l| l.id.0).collect()
    }

    const WORDS: [&str; 8] = [
        "pintar", "Mudanza", "jardín", "perro", "clases", "Limpieza", "router", "baño",
    ];
    const COMMUNES: [&str; 5] = ["Providencia", "Ñuñoa", "Las Condes", "Maipú", "Vitacura"];
    const BUDGETS: [u64; 10] = [0, 4_999, 5_000, 5_001, 15_000, 15_001, 30_000, 30_001, 12_500, 80_000];

    fn random_listing(rng: &mut StdRng, id: u32) -> ServiceListing {
        let title = format!("{} {}", WORDS.choose(rng).unwrap(), WORDS.choose(rng).unwrap());
        let description = WORDS.choose(rng).unwrap().to_string();
        ServiceListing {
            id: ListingId(id),
            title,
            description,
            budget: *BUDGETS.choose(rng).unwrap(),
            location: format!("{}, Santiago", COMMUNES.choose(rng).unwrap()),
            category: *Category::ALL.choose(rng).unwrap(),
            status: if rng.gen_bool(0.6) {
                ListingStatus::Open
            } else {
                ListingStatus::Assigned
            },
            offers: rng.gen_range(0..3),
            posted_by: PublicProfile {
                id: ProviderId(1),
                name: "Test".into(),
                avatar: String::new(),
                rating: 4.0,
                review_count: 1,
            },
            coordinates: Some(Coordinates::new(-33.4, -70.6)),
            urgent: rng.gen_bool(0.2),
            posted_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap(),
        }
    }

    fn random_filters(rng: &mut StdRng) -> FilterState {
        let query = if rng.gen_bool(0.4) {
            String::new()
        } else {
            let word = WORDS.choose(rng).unwrap();
            if rng.gen_bool(0.5) {
                word.to_uppercase()
            } else {
                word.to_string()
            }
        };
        FilterState {
            search_query: query,
            category: if rng.gen_bool(0.5) {
                CategoryFilter::All
            } else {
                CategoryFilter::Only(*Category::ALL.choose(rng).unwrap())
            },
            location: if rng.gen_bool(0.5) {
                LocationFilter::All
            } else {
                LocationFilter::Named(COMMUNES.choose(rng).unwrap().to_string())
            },
            price_range: *PriceRange::ALL.choose(rng).unwrap(),
            sort_by: *SortOrder::ALL.choose(rng).unwrap(),
            show_available_only: rng.gen_bool(0.5),
            show_no_offers_only: rng.gen_bool(0.3),
            work_type: *[WorkType::All, WorkType::InPerson, WorkType::Remotely]
                .choose(rng)
                .unwrap(),
            distance: Distance::new(rng.gen_range(-5..30)),
        }
    }

    // Spelled out by hand so the composed filter is checked against something independent.
    fn manual_match(l: &ServiceListing, f: &FilterState) -> bool {
        let q = f.search_query.to_lowercase();
        let text = q.is_empty()
            || l.title.to_lowercase().contains(&q)
            || l.description.to_lowercase().contains(&q);
        let category = match f.category {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => c == l.category,
        };
        let location = match &f.location {
            LocationFilter::All => true,
            LocationFilter::Named(n) => l.location.contains(n.as_str()),
        };
        let b = l.budget;
        let price = match f.price_range {
            PriceRange::Any => true,
            PriceRange::UpTo5k => b <= 5000,
            PriceRange::From5kTo15k => b > 5000 && b <= 15000,
            PriceRange::From15kTo30k => b > 15000 && b <= 30000,
            PriceRange::Over30k => b > 30000,
        };
        let available = !f.show_available_only || l.status == ListingStatus::Open;
        let no_offers = !f.show_no_offers_only || l.offers == 0;
        text && category && location && price && available && no_offers
    }

    #[test]
    fn composition_is_conjunctive_over_random_inputs() {
        let mut rng = StdRng::seed_from_u64(0x5eed_2026);
        for round in 0..2_000 {
            let listing = random_listing(&mut rng, round);
            let filters = random_filters(&mut rng);
            let single = std::slice::from_ref(&listing);
            assert_eq!(
                !filter_listings(single, &filters).is_empty(),
                manual_match(&listing, &filters),
                "listing {listing:?} filters {filters:?}"
            );
        }
    }

    #[test]
    fn sentinels_never_exclude_on_their_axis() {
        let mut rng = StdRng::seed_from_u64(7);
        for id in 0..500 {
            let listing = random_listing(&mut rng, id);
            assert!(matches_category(&listing, &CategoryFilter::All));
            assert!(matches_location(&listing, &LocationFilter::All));
            assert!(matches_price(&listing, PriceRange::Any));
        }
    }

    #[test]
    fn filtering_preserves_input_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let listings: Vec<_> = (0..200).map(|id| random_listing(&mut rng, id)).collect();
        let filters = FilterState {
            show_available_only: false,
            ..FilterState::default()
        };
        let result = ids(&filter_listings(&listings, &filters));
        let mut sorted = result.clone();
        sorted.sort_unstable();
        assert_eq!(result, sorted);
        assert_eq!(result.len(), 200);
    }

    #[test]
    fn price_bucket_boundaries() {
        assert!(PriceRange::UpTo5k.contains(5_000));
        assert!(!PriceRange::From5kTo15k.contains(5_000));
        assert!(PriceRange::From5kTo15k.contains(15_000));
        assert!(!PriceRange::From15kTo30k.contains(15_000));
        assert!(PriceRange::From15kTo30k.contains(30_000));
        assert!(!PriceRange::Over30k.contains(30_000));
        assert!(PriceRange::Over30k.contains(30_001));
    }

    #[test]
    fn default_filters_return_the_open_listings() {
        let listings = sample();
        let expected: Vec<u32> = listings
            .iter()
            .filter(|l| l.status == ListingStatus::Open)
            .map(|l| l.id.0)
            .collect();
        let result = ids(&filter_listings(&listings, &FilterState::default()));
        assert_eq!(result, expected);
        assert_eq!(result, vec![1, 2, 3, 5, 6, 7, 8, 10]);
    }

    #[test]
    fn price_bucket_scenario_on_sample_data() {
        let listings = sample();
        let mut filters = FilterState::default();
        filters.apply(FilterUpdate::PriceRange(
            PriceRange::from_label("$15.000 - $30.000").unwrap(),
        ));
        let result = filter_listings(&listings, &filters);
        assert_eq!(ids(&result), vec![1, 5, 7]);
        let mut budgets: Vec<u64> = result.iter().map(|l| l.budget).collect();
        budgets.sort_unstable();
        assert_eq!(budgets, vec![18_000, 20_000, 25_000]);
    }

    #[test]
    fn text_search_is_case_insensitive() {
        let listings = sample();
        for query in ["mudanza", "MUDANZA", "MuDaNzA"] {
            let filters = FilterState {
                search_query: query.to_string(),
                ..FilterState::default()
            };
            assert_eq!(ids(&filter_listings(&listings, &filters)), vec![7]);
        }
    }

    #[test]
    fn location_and_no_offers_filters_combine() {
        let listings = sample();
        let filters = FilterState {
            location: LocationFilter::from_label("Providencia").unwrap(),
            show_no_offers_only: true,
            ..FilterState::default()
        };
        assert_eq!(ids(&filter_listings(&listings, &filters)), vec![6]);
    }

    #[test]
    fn work_type_and_distance_do_not_filter() {
        let listings = sample();
        let baseline = ids(&filter_listings(&listings, &FilterState::default()));
        let filters = FilterState {
            work_type: WorkType::Remotely,
            distance: Distance::new(1),
            ..FilterState::default()
        };
        assert_eq!(ids(&filter_listings(&listings, &filters)), baseline);
    }

    #[test]
    fn unknown_labels_do_not_parse() {
        assert_eq!(CategoryFilter::from_label("todas las categorías"), None);
        assert_eq!(CategoryFilter::from_label(ALL_CATEGORIES_LABEL), Some(CategoryFilter::All));
        assert_eq!(LocationFilter::from_label(""), None);
        assert_eq!(PriceRange::from_label("$15.000-$30.000"), None);
        assert_eq!(WorkType::from_value("hybrid"), None);
    }

    #[test]
    fn distance_is_clamped() {
        assert_eq!(Distance::new(0).km(), 1);
        assert_eq!(Distance::new(25).km(), 20);
        assert_eq!(Distance::new(7).km(), 7);
        assert_eq!(Distance::default().km(), 10);
    }

    #[test]
    fn each_counted_field_adds_exactly_one() {
        let updates = vec![
            FilterUpdate::Category(CategoryFilter::Only(Category::Moving)),
            FilterUpdate::Location(LocationFilter::Named("Ñuñoa".into())),
            FilterUpdate::PriceRange(PriceRange::Over30k),
            FilterUpdate::NoOffersOnly(true),
            FilterUpdate::AvailableOnly(false),
            FilterUpdate::WorkType(WorkType::InPerson),
            FilterUpdate::Distance(Distance::new(15)),
        ];
        let mut cumulative = FilterState::default();
        for (idx, update) in updates.into_iter().enumerate() {
            let mut single = FilterState::default();
            single.apply(update.clone());
            assert_eq!(active_filter_count(&single), 1, "{update:?}");

            cumulative.apply(update);
            assert_eq!(active_filter_count(&cumulative), idx + 1);
        }
        cumulative.reset();
        assert_eq!(active_filter_count(&cumulative), 0);
        assert_eq!(cumulative, FilterState::default());
    }

    #[test]
    fn search_and_sort_are_not_counted() {
        let mut filters = FilterState::default();
        filters.apply(FilterUpdate::SearchQuery("pasto".into()));
        filters.apply(FilterUpdate::SortBy(SortOrder::FewestOffers));
        assert_eq!(active_filter_count(&filters), 0);
    }

    #[test]
    fn sort_orders_are_stable() {
        let listings = sample();
        let mut results = filter_listings(&listings, &FilterState::default());

        sort_listings(&mut results, SortOrder::BudgetLowToHigh);
        assert_eq!(ids(&results), vec![10, 3, 2, 8, 5, 7, 1, 6]);

        sort_listings(&mut results, SortOrder::FewestOffers);
        assert_eq!(ids(&results), vec![2, 8, 6, 10, 5, 3, 1, 7]);

        sort_listings(&mut results, SortOrder::Recent);
        assert_eq!(results.first().map(|l| l.id.0), Some(7));
    }

    #[test]
    fn facets_count_the_whole_catalogue() {
        let listings = sample();
        let filters = FilterState {
            category: CategoryFilter::Only(Category::Repairs),
            ..FilterState::default()
        };
        let categories = category_facets(&listings, &filters);
        let repairs = categories.iter().find(|f| f.label == "Reparaciones").unwrap();
        assert_eq!(repairs.count, 3);
        assert!(repairs.selected);

        let locations = location_facets(&listings, &filters);
        let providencia = locations.iter().find(|f| f.label == "Providencia").unwrap();
        assert_eq!(providencia.count, 2);
        assert!(!providencia.selected);
        assert_eq!(location_key("Ñuñoa, Santiago"), "Ñuñoa");
    }
}
