//! Core domain model for the Encargo services marketplace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod card;

pub const CRATE_NAME: &str = "encargo-core";

/// Santiago city-center, used whenever no better location is known.
pub const SANTIAGO_CENTER: Coordinates = Coordinates {
    latitude: -33.4489,
    longitude: -70.6693,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub u32);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub u32);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of task categories offered in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Limpieza")]
    Cleaning,
    #[serde(rename = "Reparaciones")]
    Repairs,
    #[serde(rename = "Mudanzas")]
    Moving,
    #[serde(rename = "Jardinería")]
    Gardening,
    #[serde(rename = "Tecnología")]
    Technology,
    #[serde(rename = "Clases")]
    Tutoring,
    #[serde(rename = "Mascotas")]
    PetCare,
    #[serde(rename = "Eventos")]
    Events,
    #[serde(rename = "Otros")]
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Cleaning,
        Category::Repairs,
        Category::Moving,
        Category::Gardening,
        Category::Technology,
        Category::Tutoring,
        Category::PetCare,
        Category::Events,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Cleaning => "Limpieza",
            Category::Repairs => "Reparaciones",
            Category::Moving => "Mudanzas",
            Category::Gardening => "Jardinería",
            Category::Technology => "Tecnología",
            Category::Tutoring => "Clases",
            Category::PetCare => "Mascotas",
            Category::Events => "Eventos",
            Category::Other => "Otros",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    /// Short blurb shown under the category heading. Empty when a category has none.
    pub fn description(self) -> &'static str {
        match self {
            Category::Cleaning => "Limpieza de hogares, oficinas y post-obra.",
            Category::Repairs => "Gasfitería, electricidad, pintura y arreglos menores.",
            Category::Moving => "Fletes, embalaje y ayuda para cargar y descargar.",
            Category::Gardening => "Corte de pasto, poda y mantención de jardines.",
            Category::Technology => "Soporte computacional, redes e instalación de equipos.",
            Category::Tutoring => "Clases particulares y reforzamiento escolar.",
            Category::PetCare => "Paseos, cuidado y alimentación de mascotas.",
            Category::Events => "Decoración, banquetería y apoyo en eventos.",
            Category::Other => "",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    #[serde(rename = "abierto")]
    Open,
    #[serde(rename = "asignado")]
    Assigned,
}

impl ListingStatus {
    pub fn label(self) -> &'static str {
        match self {
            ListingStatus::Open => "abierto",
            ListingStatus::Assigned => "asignado",
        }
    }
}

/// Denormalized, read-only snapshot of the poster's public profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: ProviderId,
    pub name: String,
    pub avatar: String,
    pub rating: f32,
    pub review_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A posted task, the unit being searched and filtered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceListing {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    /// Amount in Chilean pesos.
    pub budget: u64,
    pub location: String,
    pub category: Category,
    pub status: ListingStatus,
    pub offers: u32,
    pub posted_by: PublicProfile,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub urgent: bool,
    pub posted_at: DateTime<Utc>,
}

impl ServiceListing {
    pub fn is_open(&self) -> bool {
        self.status == ListingStatus::Open
    }

    pub fn budget_label(&self) -> String {
        format_clp(self.budget)
    }

    pub fn offers_label(&self) -> String {
        match self.offers {
            0 => "Sin ofertas".to_string(),
            1 => "1 oferta".to_string(),
            n => format!("{n} ofertas"),
        }
    }

    pub fn contact_handoff(&self) -> ContactHandoff {
        ContactHandoff {
            contact_name: self.posted_by.name.clone(),
            provider_id: self.posted_by.id,
        }
    }
}

/// Formats a peso amount the way it is shown in Chile: `$25.000`.
pub fn format_clp(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    out.push('$');
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Hand-off from a listing to the messaging view. The two query parameters are
/// `contact` (display name) and `providerId` (numeric id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHandoff {
    #[serde(rename = "contact")]
    pub contact_name: String,
    #[serde(rename = "providerId")]
    pub provider_id: ProviderId,
}

impl ContactHandoff {
    pub fn to_href(&self, base_path: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("contact", &self.contact_name)
            .append_pair("providerId", &self.provider_id.to_string())
            .finish();
        format!("{base_path}?{query}")
    }
}
