//! Axum + Askama web UI for browsing Encargo listings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Form, Path as AxumPath, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use encargo_browse::{
    category_facets, location_facets, BrowseView, CategoryFilter, DetailPhase, Distance,
    FacetCount, FilterState, FilterUpdate, FlyToRequest, LocationFilter, Presentation, PriceRange,
    SelectionEffect, SortOrder, ViewSnapshot, Viewport, WorkType, ALL_LOCATIONS_LABEL,
};
use encargo_core::card::CardPreview;
use encargo_core::{ContactHandoff, ListingId, ServiceListing};
use encargo_geo::{DeviceStep, GeoConfig, LocationResolver, LocationStatus, ReportedPosition};
use encargo_listings::listing_source_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "encargo-web";

pub const DEFAULT_MAP_STYLE_URL: &str = "https://tiles.openfreemap.org/styles/liberty";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_addr: String,
    pub port: u16,
    pub workspace_root: PathBuf,
    pub listing_source: String,
    pub map_style_url: String,
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("ENCARGO_WEB_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("ENCARGO_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            workspace_root: std::env::var("ENCARGO_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            listing_source: std::env::var("ENCARGO_LISTING_SOURCE")
                .unwrap_or_else(|_| "sample".to_string()),
            map_style_url: std::env::var("ENCARGO_MAP_STYLE_URL")
                .unwrap_or_else(|_| DEFAULT_MAP_STYLE_URL.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub workspace_root: PathBuf,
    pub map_style_url: String,
    catalog: Arc<Vec<ServiceListing>>,
    views: Arc<Mutex<HashMap<Uuid, BrowseView>>>,
    resolver: Arc<LocationResolver>,
}

impl AppState {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        catalog: Vec<ServiceListing>,
        resolver: LocationResolver,
        map_style_url: impl Into<String>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            map_style_url: map_style_url.into(),
            catalog: Arc::new(catalog),
            views: Arc::new(Mutex::new(HashMap::new())),
            resolver: Arc::new(resolver),
        }
    }

    pub fn catalog(&self) -> &[ServiceListing] {
        &self.catalog
    }

    fn find_listing(&self, id: ListingId) -> Option<&ServiceListing> {
        self.catalog.iter().find(|l| l.id == id)
    }

    async fn with_view<R>(
        &self,
        sid: Uuid,
        f: impl FnOnce(&mut BrowseView, &[ServiceListing]) -> R,
    ) -> Result<R, WebError> {
        let mut views = self.views.lock().await;
        let view = views
            .get_mut(&sid)
            .ok_or_else(|| WebError::NotFound(format!("browse view {sid}")))?;
        Ok(f(view, &self.catalog))
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Conflict(_) => StatusCode::CONFLICT,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match &self {
            WebError::Internal(err) => tracing::error!(error = ?err, "internal server error"),
            _ => tracing::warn!(error = %self, "request rejected"),
        }
        (status, Html(self.to_string())).into_response()
    }
}

#[derive(Debug, Clone)]
struct OptionRow {
    value: String,
    label: String,
    selected: bool,
}

impl OptionRow {
    fn new(value: impl Into<String>, label: impl Into<String>, selected: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected,
        }
    }
}

#[derive(Debug, Clone)]
struct FilterFormView {
    search_query: String,
    categories: Vec<OptionRow>,
    locations: Vec<OptionRow>,
    prices: Vec<OptionRow>,
    sorts: Vec<OptionRow>,
    work_types: Vec<OptionRow>,
    show_available_only: bool,
    show_no_offers_only: bool,
    distance: u8,
    distance_min: u8,
    distance_max: u8,
}

impl FilterFormView {
    fn build(filters: &FilterState, catalog: &[ServiceListing]) -> Self {
        let categories = CategoryFilter::options()
            .into_iter()
            .map(|label| OptionRow::new(label, label, filters.category.label() == label))
            .collect();
        let locations = std::iter::once(ALL_LOCATIONS_LABEL.to_string())
            .chain(location_facets(catalog, filters).into_iter().map(|f| f.label))
            .map(|label| {
                let selected = filters.location.label() == label;
                OptionRow::new(label.clone(), label, selected)
            })
            .collect();
        let prices = PriceRange::ALL
            .into_iter()
            .map(|p| OptionRow::new(p.label(), p.label(), filters.price_range == p))
            .collect();
        let sorts = SortOrder::ALL
            .into_iter()
            .map(|s| OptionRow::new(s.label(), s.label(), filters.sort_by == s))
            .collect();
        let work_types = [WorkType::All, WorkType::InPerson, WorkType::Remotely]
            .into_iter()
            .map(|w| OptionRow::new(w.as_str(), w.label(), filters.work_type == w))
            .collect();
        Self {
            search_query: filters.search_query.clone(),
            categories,
            locations,
            prices,
            sorts,
            work_types,
            show_available_only: filters.show_available_only,
            show_no_offers_only: filters.show_no_offers_only,
            distance: filters.distance.km(),
            distance_min: Distance::MIN,
            distance_max: Distance::MAX,
        }
    }
}

#[derive(Debug, Clone)]
struct ListingCard {
    id: u32,
    title: String,
    description: String,
    category: &'static str,
    location: String,
    budget_label: String,
    offers_label: String,
    status_label: &'static str,
    poster_name: String,
    poster_rating: String,
    poster_reviews: u32,
    urgent: bool,
    selected: bool,
}

impl ListingCard {
    fn from_listing(listing: &ServiceListing, selected: Option<ListingId>) -> Self {
        Self {
            id: listing.id.0,
            title: listing.title.clone(),
            description: listing.description.clone(),
            category: listing.category.label(),
            location: listing.location.clone(),
            budget_label: listing.budget_label(),
            offers_label: listing.offers_label(),
            status_label: listing.status.label(),
            poster_name: listing.posted_by.name.clone(),
            poster_rating: format!("{:.1}", listing.posted_by.rating),
            poster_reviews: listing.posted_by.review_count,
            urgent: listing.urgent,
            selected: selected == Some(listing.id),
        }
    }
}

#[derive(Template)]
#[template(path = "browse.html")]
struct BrowseTemplate {
    sid: String,
    viewport: &'static str,
    filters: FilterFormView,
    active_filter_count: usize,
    location_message: String,
    location_can_retry: bool,
    map_style_url: String,
    map_visible: bool,
}

#[derive(Template)]
#[template(path = "results_partial.html")]
struct ResultsPartialTemplate {
    sid: String,
    cards: Vec<ListingCard>,
    result_count: usize,
    active_filter_count: usize,
    show_available_only: bool,
    show_no_offers_only: bool,
}

#[derive(Template)]
#[template(path = "facets_partial.html")]
struct FacetsPartialTemplate {
    categories: Vec<FacetCount>,
    locations: Vec<FacetCount>,
}

#[derive(Template)]
#[template(path = "detail_partial.html")]
struct DetailPartialTemplate {
    sid: String,
    card: ListingCard,
    category_description: &'static str,
    contact_href: String,
    presentation: &'static str,
    exiting: bool,
}

/// Out-of-band replacement of the `#detail` slot for htmx callers.
#[derive(Template)]
#[template(path = "detail_oob.html")]
struct DetailOobTemplate {
    detail_html: String,
}

#[derive(Template)]
#[template(path = "listing_detail.html")]
struct ListingDetailTemplate {
    card: ListingCard,
    category_description: &'static str,
    contact_href: String,
    coordinates_text: String,
}

#[derive(Template)]
#[template(path = "messages.html")]
struct MessagesTemplate {
    contact_name: String,
    provider_id: u32,
    greeting: String,
}

#[derive(Debug, Deserialize, Default)]
struct MountQuery {
    viewport: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterForm {
    q: Option<String>,
    category: Option<String>,
    location: Option<String>,
    price: Option<String>,
    sort: Option<String>,
    available_only: Option<String>,
    no_offers_only: Option<String>,
    work_type: Option<String>,
    distance: Option<i64>,
}

fn parse_flag(field: &str, value: &str) -> Result<bool, WebError> {
    match value {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        other => Err(WebError::BadRequest(format!("{field}: unexpected value {other:?}"))),
    }
}

impl FilterForm {
    /// Unknown option labels are a bad request.
    fn into_updates(self) -> Result<Vec<FilterUpdate>, WebError> {
        let mut updates = Vec::new();
        if let Some(q) = self.q {
            updates.push(FilterUpdate::SearchQuery(q));
        }
        if let Some(label) = self.category {
            let filter = CategoryFilter::from_label(&label)
                .ok_or_else(|| WebError::BadRequest(format!("unknown category {label:?}")))?;
            updates.push(FilterUpdate::Category(filter));
        }
        if let Some(label) = self.location {
            let filter = LocationFilter::from_label(&label)
                .ok_or_else(|| WebError::BadRequest(format!("unknown location {label:?}")))?;
            updates.push(FilterUpdate::Location(filter));
        }
        if let Some(label) = self.price {
            let range = PriceRange::from_label(&label)
                .ok_or_else(|| WebError::BadRequest(format!("unknown price range {label:?}")))?;
            updates.push(FilterUpdate::PriceRange(range));
        }
        if let Some(label) = self.sort {
            let order = SortOrder::from_label(&label)
                .ok_or_else(|| WebError::BadRequest(format!("unknown sort order {label:?}")))?;
            updates.push(FilterUpdate::SortBy(order));
        }
        if let Some(value) = self.available_only {
            updates.push(FilterUpdate::AvailableOnly(parse_flag("available_only", &value)?));
        }
        if let Some(value) = self.no_offers_only {
            updates.push(FilterUpdate::NoOffersOnly(parse_flag("no_offers_only", &value)?));
        }
        if let Some(value) = self.work_type {
            let work_type = WorkType::from_value(&value)
                .ok_or_else(|| WebError::BadRequest(format!("unknown work type {value:?}")))?;
            updates.push(FilterUpdate::WorkType(work_type));
        }
        if let Some(km) = self.distance {
            updates.push(FilterUpdate::Distance(Distance::new(km)));
        }
        Ok(updates)
    }
}

#[derive(Debug, Deserialize, Default)]
struct LocationForm {
    latitude: Option<f64>,
    longitude: Option<f64>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct CardPreviewQuery {
    #[serde(default)]
    number: String,
    #[serde(default)]
    holder: String,
    #[serde(default)]
    expiry: String,
    #[serde(default)]
    cvv: String,
}

#[derive(Debug, Serialize)]
struct SelectionResponse {
    #[serde(flatten)]
    effect: EffectBody,
    view: ViewSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
enum EffectBody {
    EnterDetail { listing_id: ListingId },
    SwapDetail { listing_id: ListingId },
    ExitDetail,
    FlyTo { request: encargo_browse::FlyToRequest },
    ShowMap,
    Ignored,
}

impl From<SelectionEffect> for EffectBody {
    fn from(effect: SelectionEffect) -> Self {
        match effect {
            SelectionEffect::EnterDetail(listing_id) => EffectBody::EnterDetail { listing_id },
            SelectionEffect::SwapDetail(listing_id) => EffectBody::SwapDetail { listing_id },
            SelectionEffect::ExitDetail => EffectBody::ExitDetail,
            SelectionEffect::FlyTo(request) => EffectBody::FlyTo { request },
            SelectionEffect::ShowMap => EffectBody::ShowMap,
            SelectionEffect::Ignored => EffectBody::Ignored,
        }
    }
}

#[derive(Debug, Serialize)]
struct LocationResponse {
    status: LocationStatus,
    message: String,
    can_retry: bool,
    attempts: u32,
}

impl LocationResponse {
    fn from_view(view: &BrowseView) -> Self {
        let status = view.location.status().clone();
        Self {
            message: status.message(),
            can_retry: status.can_retry(),
            attempts: view.location.attempts(),
            status,
        }
    }
}

/// Detail of the `stageChanged` client event sent with every selection transition.
#[derive(Debug, Serialize)]
struct StageEvent {
    phase: DetailPhase,
    presentation: Presentation,
    map_visible: bool,
    selected: Option<ListingId>,
    fly_to: Option<FlyToRequest>,
}

impl StageEvent {
    fn from_view(view: &BrowseView) -> Self {
        Self {
            phase: view.selection.phase(),
            presentation: view.selection.presentation(),
            map_visible: view.selection.map_visible(),
            selected: view.selection.selected_id(),
            fly_to: view.selection.fly_to().cloned(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(mount_handler))
        .route("/browse/{sid}", get(browse_page_handler).delete(unmount_handler))
        .route("/browse/{sid}/results", get(results_handler))
        .route("/browse/{sid}/facets", get(facets_handler))
        .route("/browse/{sid}/filters", post(filters_handler))
        .route("/browse/{sid}/filters/reset", post(filters_reset_handler))
        .route("/browse/{sid}/select/{id}", post(select_handler))
        .route("/browse/{sid}/detail", get(detail_handler))
        .route("/browse/{sid}/view-on-map", post(view_on_map_handler))
        .route("/browse/{sid}/dismiss", post(dismiss_handler))
        .route("/browse/{sid}/exit-complete", post(exit_complete_handler))
        .route("/browse/{sid}/state", get(state_handler))
        .route("/browse/{sid}/map.json", get(map_handler))
        .route("/browse/{sid}/location", post(location_handler))
        .route("/browse/{sid}/location/retry", post(location_retry_handler))
        .route("/listings/{id}", get(listing_detail_handler))
        .route("/messages", get(messages_handler))
        .route("/wallet/card-preview", get(card_preview_handler))
        .route("/assets/static/{file}", get(static_asset_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = WebConfig::from_env();
    let geo = GeoConfig::from_env();

    let source = listing_source_for(&config.listing_source, &config.workspace_root)?
        .ok_or_else(|| anyhow::anyhow!("unknown listing source {}", config.listing_source))?;
    let catalog = source.fetch_listings().await?;
    let resolver = LocationResolver::from_config(&geo)?;
    info!(
        source = source.source_id(),
        listings = catalog.len(),
        "listing catalogue loaded"
    );

    let state = AppState::new(
        config.workspace_root.clone(),
        catalog,
        resolver,
        config.map_style_url.clone(),
    );
    let listener = TcpListener::bind((config.bind_addr.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "encargo web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn render_string<T: Template>(tpl: &T) -> Result<String, WebError> {
    tpl.render()
        .map_err(|err| WebError::Internal(anyhow::anyhow!(err.to_string())))
}

fn render_html<T: Template>(tpl: T) -> Result<Response, WebError> {
    Ok(Html(render_string(&tpl)?).into_response())
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("hx-request")
        .is_some_and(|v| v.as_bytes() == b"true")
}

fn with_hx_trigger(mut resp: Response, event: &'static str) -> Response {
    resp.headers_mut().insert(
        header::HeaderName::from_static("hx-trigger"),
        HeaderValue::from_static(event),
    );
    resp
}

/// Sets `HX-Trigger` to a JSON object: `stageChanged` plus an optional bare event.
fn with_stage_trigger(
    mut resp: Response,
    event: Option<&str>,
    stage: &StageEvent,
) -> Result<Response, WebError> {
    let mut events = serde_json::Map::new();
    if let Some(event) = event {
        events.insert(event.to_string(), serde_json::Value::Bool(true));
    }
    let stage = serde_json::to_value(stage).map_err(|err| WebError::Internal(err.into()))?;
    events.insert("stageChanged".to_string(), stage);
    let value = serde_json::Value::Object(events).to_string();
    let value = HeaderValue::from_str(&value).map_err(|err| WebError::Internal(err.into()))?;
    resp.headers_mut()
        .insert(header::HeaderName::from_static("hx-trigger"), value);
    Ok(resp)
}

fn parse_viewport(raw: Option<&str>) -> Result<Option<Viewport>, WebError> {
    raw.map(|v| {
        Viewport::from_param(v).ok_or_else(|| WebError::BadRequest(format!("unknown viewport {v:?}")))
    })
    .transpose()
}

fn results_partial(sid: Uuid, view: &BrowseView, catalog: &[ServiceListing]) -> ResultsPartialTemplate {
    let selected = view.selection.selected_id();
    let cards: Vec<ListingCard> = view
        .results(catalog)
        .into_iter()
        .map(|l| ListingCard::from_listing(l, selected))
        .collect();
    ResultsPartialTemplate {
        sid: sid.to_string(),
        result_count: cards.len(),
        cards,
        active_filter_count: view.active_filter_count(),
        show_available_only: view.filters.show_available_only,
        show_no_offers_only: view.filters.show_no_offers_only,
    }
}

fn detail_partial(sid: Uuid, view: &BrowseView) -> Option<DetailPartialTemplate> {
    let listing = view.selection.selected()?;
    if view.selection.phase() == DetailPhase::Browsing {
        return None;
    }
    let presentation = match view.selection.presentation() {
        Presentation::Sheet => "sheet",
        _ => "side_panel",
    };
    Some(DetailPartialTemplate {
        sid: sid.to_string(),
        card: ListingCard::from_listing(listing, Some(listing.id)),
        category_description: listing.category.description(),
        contact_href: listing.contact_handoff().to_href("/messages"),
        presentation,
        exiting: view.selection.phase() == DetailPhase::Exiting,
    })
}

async fn mount_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MountQuery>,
) -> Result<Response, WebError> {
    let viewport = parse_viewport(query.viewport.as_deref())?.unwrap_or_default();
    let sid = Uuid::new_v4();
    let view = BrowseView::with_default_location(viewport, state.resolver.default_location());
    state.views.lock().await.insert(sid, view);
    debug!(%sid, ?viewport, "browse view mounted");
    Ok(Redirect::to(&format!("/browse/{sid}")).into_response())
}

async fn unmount_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<StatusCode, WebError> {
    match state.views.lock().await.remove(&sid) {
        Some(_) => {
            debug!(%sid, "browse view unmounted");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(WebError::NotFound(format!("browse view {sid}"))),
    }
}

async fn browse_page_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
    Query(query): Query<MountQuery>,
) -> Result<Response, WebError> {
    let viewport = parse_viewport(query.viewport.as_deref())?;
    let tpl = state
        .with_view(sid, |view, catalog| {
            if let Some(viewport) = viewport {
                view.selection.set_viewport(viewport);
            }
            if matches!(view.location.status(), LocationStatus::Idle) {
                view.location.begin();
            }
            BrowseTemplate {
                sid: sid.to_string(),
                viewport: match view.selection.viewport() {
                    Viewport::Desktop => "desktop",
                    Viewport::Mobile => "mobile",
                },
                filters: FilterFormView::build(&view.filters, catalog),
                active_filter_count: view.active_filter_count(),
                location_message: view.location.status().message(),
                location_can_retry: view.location.status().can_retry(),
                map_style_url: state.map_style_url.clone(),
                map_visible: view.selection.map_visible(),
            }
        })
        .await?;
    render_html(tpl)
}

async fn results_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let tpl = state
        .with_view(sid, |view, catalog| results_partial(sid, view, catalog))
        .await?;
    Ok(with_hx_trigger(render_html(tpl)?, "resultsLoaded"))
}

async fn facets_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let tpl = state
        .with_view(sid, |view, catalog| FacetsPartialTemplate {
            categories: category_facets(catalog, &view.filters),
            locations: location_facets(catalog, &view.filters),
        })
        .await?;
    render_html(tpl)
}

async fn filters_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
    Form(form): Form<FilterForm>,
) -> Result<Response, WebError> {
    let updates = form.into_updates()?;
    let tpl = state
        .with_view(sid, |view, catalog| {
            for update in updates {
                view.filters.apply(update);
            }
            results_partial(sid, view, catalog)
        })
        .await?;
    Ok(with_hx_trigger(render_html(tpl)?, "filtersChanged"))
}

async fn filters_reset_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let tpl = state
        .with_view(sid, |view, catalog| {
            view.filters.reset();
            results_partial(sid, view, catalog)
        })
        .await?;
    Ok(with_hx_trigger(render_html(tpl)?, "filtersChanged"))
}

async fn select_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((sid, id)): AxumPath<(Uuid, u32)>,
) -> Result<Response, WebError> {
    let (effect, tpl, stage) = state
        .with_view(sid, |view, catalog| {
            let effect = view
                .select_by_id(catalog, ListingId(id))
                .map_err(|err| WebError::NotFound(err.to_string()))?;
            Ok::<_, WebError>((effect, detail_partial(sid, view), StageEvent::from_view(view)))
        })
        .await??;
    let tpl = tpl.ok_or_else(|| WebError::Internal(anyhow::anyhow!("detail missing after select")))?;
    let event = match effect {
        SelectionEffect::SwapDetail(_) => "detailSwapped",
        _ => "detailEntered",
    };
    with_stage_trigger(render_html(tpl)?, Some(event), &stage)
}

async fn detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let tpl = state.with_view(sid, |view, _| detail_partial(sid, view)).await?;
    match tpl {
        Some(tpl) => render_html(tpl),
        None => Ok(Html(String::new()).into_response()),
    }
}

/// htmx callers get the `#detail` slot back out of band; everyone else gets JSON.
async fn selection_transition(
    state: &AppState,
    sid: Uuid,
    headers: &HeaderMap,
    transition: impl FnOnce(&mut BrowseView) -> SelectionEffect,
) -> Result<Response, WebError> {
    let (body, stage, detail) = state
        .with_view(sid, |view, catalog| {
            let effect = transition(view);
            let body = SelectionResponse {
                effect: effect.into(),
                view: view.snapshot(catalog),
            };
            (body, StageEvent::from_view(view), detail_partial(sid, view))
        })
        .await?;
    let resp = if is_htmx(headers) {
        let detail_html = match detail {
            Some(tpl) => render_string(&tpl)?,
            None => String::new(),
        };
        render_html(DetailOobTemplate { detail_html })?
    } else {
        Json(body).into_response()
    };
    with_stage_trigger(resp, None, &stage)
}

async fn view_on_map_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    selection_transition(&state, sid, &headers, |view| view.selection.view_on_map()).await
}

async fn dismiss_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    selection_transition(&state, sid, &headers, |view| view.selection.dismiss()).await
}

async fn exit_complete_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    selection_transition(&state, sid, &headers, |view| view.selection.complete_exit()).await
}

async fn state_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Json<ViewSnapshot>, WebError> {
    let snapshot = state.with_view(sid, |view, catalog| view.snapshot(catalog)).await?;
    Ok(Json(snapshot))
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let map = state
        .with_view(sid, |view, catalog| view.map_view(catalog, &state.map_style_url))
        .await?;
    Ok(Json(map).into_response())
}

async fn location_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
    Form(form): Form<LocationForm>,
) -> Result<Json<LocationResponse>, WebError> {
    let report = ReportedPosition::from_parts(form.latitude, form.longitude, form.error_code);

    let pending = state
        .with_view(sid, |view, _| {
            let status = view.location.status();
            if !matches!(status, LocationStatus::Locating) && !view.location.begin() {
                return Err(WebError::Conflict("location lookup already running".to_string()));
            }
            match state.resolver.after_device(report.0) {
                DeviceStep::Located(outcome) | DeviceStep::Fallback(outcome) => {
                    view.location.finish(outcome);
                    Ok(None)
                }
                DeviceStep::NeedsApproximation(err) => {
                    view.location.approximating(&err);
                    Ok(Some(err))
                }
            }
        })
        .await??;

    // The view lock is released while the IP lookup runs.
    if let Some(reason) = pending {
        let outcome = state.resolver.approximate(&reason).await;
        state
            .with_view(sid, |view, _| view.location.finish(outcome))
            .await?;
    }

    let body = state
        .with_view(sid, |view, _| LocationResponse::from_view(view))
        .await?;
    Ok(Json(body))
}

async fn location_retry_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<Uuid>,
) -> Result<Json<LocationResponse>, WebError> {
    let body = state
        .with_view(sid, |view, _| {
            if !view.location.retry() {
                return Err(WebError::Conflict("nothing to retry".to_string()));
            }
            Ok(LocationResponse::from_view(view))
        })
        .await??;
    Ok(Json(body))
}

async fn listing_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<u32>,
) -> Result<Response, WebError> {
    let listing = state
        .find_listing(ListingId(id))
        .ok_or_else(|| WebError::NotFound(format!("listing {id}")))?;
    let coordinates_text = match listing.coordinates {
        Some(c) => format!("{:.4}, {:.4}", c.latitude, c.longitude),
        None => "Sin ubicación en el mapa".to_string(),
    };
    render_html(ListingDetailTemplate {
        card: ListingCard::from_listing(listing, None),
        category_description: listing.category.description(),
        contact_href: listing.contact_handoff().to_href("/messages"),
        coordinates_text,
    })
}

async fn messages_handler(Query(handoff): Query<ContactHandoff>) -> Result<Response, WebError> {
    if handoff.contact_name.trim().is_empty() {
        return Err(WebError::BadRequest("contact name is required".to_string()));
    }
    render_html(MessagesTemplate {
        greeting: format!(
            "Cuéntale a {} qué necesitas y coordinen los detalles por aquí.",
            handoff.contact_name
        ),
        contact_name: handoff.contact_name,
        provider_id: handoff.provider_id.0,
    })
}

async fn card_preview_handler(Query(query): Query<CardPreviewQuery>) -> Json<CardPreview> {
    Json(CardPreview::from_input(
        &query.number,
        &query.holder,
        &query.expiry,
        &query.cvv,
    ))
}

/// Only the known asset names are served; anything else is a 404.
async fn static_asset_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(file): AxumPath<String>,
) -> Result<Response, WebError> {
    let content_type = match file.as_str() {
        "app.css" => "text/css; charset=utf-8",
        "browse.js" => "text/javascript; charset=utf-8",
        _ => return Err(WebError::NotFound(format!("asset {file}"))),
    };
    let path = static_asset_path(&state.workspace_root, &file);
    let body = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| WebError::NotFound(format!("asset {}", path.display())))?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

pub fn static_asset_path(workspace_root: &Path, file: &str) -> PathBuf {
    workspace_root.join("assets/static").join(file)
}
