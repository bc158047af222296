//! User location acquisition: device position, IP approximation, fixed default.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encargo_core::{Coordinates, SANTIAGO_CENTER};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "encargo-geo";

pub const DEFAULT_IP_ENDPOINT: &str = "https://ipapi.co/json/";

#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub ip_endpoint: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub default_location: Coordinates,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            ip_endpoint: DEFAULT_IP_ENDPOINT.to_string(),
            timeout: Duration::from_secs(5),
            user_agent: Some("encargo/0.1".to_string()),
            default_location: SANTIAGO_CENTER,
        }
    }
}

impl GeoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ip_endpoint: std::env::var("ENCARGO_IP_GEO_URL").unwrap_or(defaults.ip_endpoint),
            timeout: std::env::var("ENCARGO_GEO_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: std::env::var("ENCARGO_USER_AGENT").ok().or(defaults.user_agent),
            default_location: defaults.default_location,
        }
    }
}

/// Failure reported by the device (browser) geolocation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("Permiso de ubicación denegado")]
    PermissionDenied,
    #[error("Ubicación no disponible")]
    PositionUnavailable,
    #[error("Se agotó el tiempo para obtener la ubicación")]
    Timeout,
    #[error("Tu navegador no soporta geolocalización")]
    Unsupported,
    #[error("Error desconocido al obtener la ubicación: {0}")]
    Unknown(String),
}

impl GeolocationError {
    /// Maps the numeric codes of the browser `GeolocationPositionError`.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::PositionUnavailable,
            3 => Self::Timeout,
            other => Self::Unknown(format!("código {other}")),
        }
    }

    /// Permission and availability failures are worth an IP lookup; the rest go
    /// straight to the default location.
    pub fn falls_back_to_ip(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::PositionUnavailable | Self::Unsupported
        )
    }
}

#[derive(Debug, Error)]
pub enum IpLookupError {
    #[error("ip geolocation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("malformed ip geolocation payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("ip geolocation payload has no usable coordinates")]
    MissingCoordinates,
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

/// A position (or failure) the browser already reported to us.
#[derive(Debug, Clone)]
pub struct ReportedPosition(pub Result<Coordinates, GeolocationError>);

impl ReportedPosition {
    /// Builds a report from loose form fields; an error code wins over coordinates.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>, error_code: Option<u16>) -> Self {
        let result = match (error_code, latitude, longitude) {
            (Some(code), _, _) => Err(GeolocationError::from_code(code)),
            (None, Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            (None, _, _) => Err(GeolocationError::Unsupported),
        };
        Self(result)
    }
}

#[async_trait]
impl PositionProvider for ReportedPosition {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        self.0.clone()
    }
}

#[async_trait]
pub trait IpLocator: Send + Sync {
    async fn locate(&self) -> Result<Coordinates, IpLookupError>;
}

#[derive(Debug, Deserialize)]
struct IpPayload {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub fn parse_ip_payload(bytes: &[u8]) -> Result<Coordinates, IpLookupError> {
    let payload: IpPayload = serde_json::from_slice(bytes)?;
    match (payload.latitude, payload.longitude) {
        (Some(lat), Some(lon)) => {
            let coords = Coordinates::new(lat, lon);
            if coords.is_valid() {
                Ok(coords)
            } else {
                Err(IpLookupError::MissingCoordinates)
            }
        }
        _ => Err(IpLookupError::MissingCoordinates),
    }
}

/// Unauthenticated IP geolocation endpoint, called once per lookup.
#[derive(Debug, Clone)]
pub struct HttpIpLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIpLocator {
    pub fn new(config: &GeoConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            endpoint: config.ip_endpoint.clone(),
        })
    }
}

#[async_trait]
impl IpLocator for HttpIpLocator {
    async fn locate(&self) -> Result<Coordinates, IpLookupError> {
        let span = info_span!("ip_geolocation", endpoint = %self.endpoint);
        async {
            let resp = self.client.get(&self.endpoint).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(IpLookupError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }
            let body = resp.bytes().await?;
            parse_ip_payload(&body)
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Device,
    IpApproximate,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFix {
    pub coordinates: Coordinates,
    pub source: LocationSource,
    pub obtained_at: DateTime<Utc>,
}

impl LocationFix {
    fn now(coordinates: Coordinates, source: LocationSource) -> Self {
        Self {
            coordinates,
            source,
            obtained_at: Utc::now(),
        }
    }
}

/// Result of a full acquisition. `failure` is set when the default location had to be used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationOutcome {
    pub fix: LocationFix,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceStep {
    Located(LocationOutcome),
    NeedsApproximation(GeolocationError),
    Fallback(LocationOutcome),
}

pub struct LocationResolver {
    ip: Arc<dyn IpLocator>,
    default_location: Coordinates,
}

impl LocationResolver {
    pub fn new(ip: Arc<dyn IpLocator>, default_location: Coordinates) -> Self {
        Self {
            ip,
            default_location,
        }
    }

    pub fn from_config(config: &GeoConfig) -> anyhow::Result<Self> {
        let ip = HttpIpLocator::new(config)?;
        Ok(Self::new(Arc::new(ip), config.default_location))
    }

    pub fn default_location(&self) -> Coordinates {
        self.default_location
    }

    pub fn fallback(&self, reason: impl Into<String>) -> LocationOutcome {
        LocationOutcome {
            fix: LocationFix::now(self.default_location, LocationSource::Default),
            failure: Some(reason.into()),
        }
    }

    /// Step 1: decide what the device result means for the chain.
    pub fn after_device(&self, device: Result<Coordinates, GeolocationError>) -> DeviceStep {
        let err = match device {
            Ok(coords) if coords.is_valid() => {
                return DeviceStep::Located(LocationOutcome {
                    fix: LocationFix::now(coords, LocationSource::Device),
                    failure: None,
                });
            }
            Ok(_) => GeolocationError::PositionUnavailable,
            Err(err) => err,
        };

        if err.falls_back_to_ip() {
            DeviceStep::NeedsApproximation(err)
        } else {
            warn!(error = %err, "device geolocation failed; using default location");
            DeviceStep::Fallback(self.fallback(err.to_string()))
        }
    }

    /// Step 2 and 3: IP approximation, then the fixed default.
    pub async fn approximate(&self, reason: &GeolocationError) -> LocationOutcome {
        debug!(reason = %reason, "trying ip geolocation");
        match self.ip.locate().await {
            Ok(coords) => LocationOutcome {
                fix: LocationFix::now(coords, LocationSource::IpApproximate),
                failure: None,
            },
            Err(err) => {
                warn!(error = %err, "ip geolocation failed; using default location");
                self.fallback(format!("{reason}. No se pudo obtener una ubicación aproximada"))
            }
        }
    }

    pub async fn resolve(&self, provider: &dyn PositionProvider) -> LocationOutcome {
        match self.after_device(provider.current_position().await) {
            DeviceStep::Located(outcome) | DeviceStep::Fallback(outcome) => outcome,
            DeviceStep::NeedsApproximation(err) => self.approximate(&err).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocationStatus {
    Idle,
    Locating,
    Approximating { reason: String },
    Located { fix: LocationFix },
    Fallback { fix: LocationFix, reason: String },
}

impl LocationStatus {
    pub fn message(&self) -> String {
        match self {
            LocationStatus::Idle => String::new(),
            LocationStatus::Locating => "Obteniendo tu ubicación...".to_string(),
            LocationStatus::Approximating { .. } => {
                "Buscando una ubicación aproximada...".to_string()
            }
            // Default fixes always arrive through `Fallback`.
            LocationStatus::Located { fix } if fix.source == LocationSource::IpApproximate => {
                "Usando tu ubicación aproximada".to_string()
            }
            LocationStatus::Located { .. } => "Ubicación encontrada".to_string(),
            LocationStatus::Fallback { reason, .. } => {
                format!("{reason}. Mostrando Santiago centro.")
            }
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            LocationStatus::Locating | LocationStatus::Approximating { .. }
        )
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, LocationStatus::Fallback { .. })
    }
}

/// Per-view location state. Only one acquisition may be outstanding at a time.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    status: LocationStatus,
    attempts: u32,
    default_location: Coordinates,
}

impl Default for LocationTracker {
    fn default() -> Self {
        Self::new(SANTIAGO_CENTER)
    }
}

impl LocationTracker {
    pub fn new(default_location: Coordinates) -> Self {
        Self {
            status: LocationStatus::Idle,
            attempts: 0,
            default_location,
        }
    }

    pub fn status(&self) -> &LocationStatus {
        &self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts an acquisition; refused while another one is still running.
    pub fn begin(&mut self) -> bool {
        if self.status.is_in_flight() {
            return false;
        }
        self.status = LocationStatus::Locating;
        self.attempts += 1;
        true
    }

    pub fn approximating(&mut self, reason: &GeolocationError) {
        if matches!(self.status, LocationStatus::Locating) {
            self.status = LocationStatus::Approximating {
                reason: reason.to_string(),
            };
        }
    }

    pub fn finish(&mut self, outcome: LocationOutcome) {
        self.status = match outcome.failure {
            Some(reason) => LocationStatus::Fallback {
                fix: outcome.fix,
                reason,
            },
            None => LocationStatus::Located { fix: outcome.fix },
        };
    }

    /// Restarts the whole sequence from the device step after a fallback.
    pub fn retry(&mut self) -> bool {
        if !self.status.can_retry() {
            return false;
        }
        debug!(attempt = self.attempts + 1, "retrying location acquisition");
        self.begin()
    }

    /// Always usable: the latest fix, or the default while nothing is known.
    pub fn current(&self) -> Coordinates {
        match &self.status {
            LocationStatus::Located { fix } | LocationStatus::Fallback { fix, .. } => {
                fix.coordinates
            }
            _ => self.default_location,
        }
    }

    pub fn source(&self) -> LocationSource {
        match &self.status {
            LocationStatus::Located { fix } | LocationStatus::Fallback { fix, .. } => fix.source,
            _ => LocationSource::Default,
        }
    }
}
