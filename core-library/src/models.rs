//! Domain models for the photo library
//!
//! Pins are geographic markers placed by the user; photos are cached image
//! records that belong to exactly one pin.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinId(pub Uuid);

impl PinId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PinId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PinId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

/// Unique identifier for a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoId(pub Uuid);

impl PhotoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhotoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

fn decode_uuid(row: &SqliteRow, column: &str) -> sqlx::Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

// =============================================================================
// Pin
// =============================================================================

/// A user-placed geographic marker.
///
/// Coordinates are fixed once the pin is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    /// Degrees, in [-90, 90]
    pub latitude: f64,
    /// Degrees, in [-180, 180]
    pub longitude: f64,
    /// Creation time (Unix epoch milliseconds)
    pub created_at: i64,
}

impl Pin {
    /// Create a new pin at the given coordinate
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            id: PinId::new(),
            latitude,
            longitude,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Validate pin coordinates
    pub fn validate(&self) -> Result<(), String> {
        validate_coordinate(self.latitude, self.longitude)
    }
}

/// Checks that a coordinate is finite and within the global range.
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<(), String> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("Latitude must be within [-90, 90], got {latitude}"));
    }

    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!(
            "Longitude must be within [-180, 180], got {longitude}"
        ));
    }

    Ok(())
}

impl<'r> FromRow<'r, SqliteRow> for Pin {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: PinId(decode_uuid(row, "id")?),
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// =============================================================================
// Photo
// =============================================================================

/// A cached image record belonging to one pin.
///
/// `image_data` stays empty until the image is first downloaded and is never
/// cleared afterwards while the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    /// Owning pin
    pub pin_id: PinId,
    /// Absolute URL of the medium-size rendition
    pub image_url: String,
    /// Downloaded image bytes
    #[serde(skip_serializing)]
    pub image_data: Option<Vec<u8>>,
    /// Creation time (Unix epoch milliseconds)
    pub created_at: i64,
}

impl Photo {
    /// Create a photo record that has not been downloaded yet
    pub fn new(pin_id: PinId, image_url: impl Into<String>) -> Self {
        Self {
            id: PhotoId::new(),
            pin_id,
            image_url: image_url.into(),
            image_data: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn has_image_data(&self) -> bool {
        self.image_data.is_some()
    }

    /// Validate photo data
    pub fn validate(&self) -> Result<(), String> {
        if self.image_url.trim().is_empty() {
            return Err("Photo image URL cannot be empty".to_string());
        }

        if matches!(&self.image_data, Some(data) if data.is_empty()) {
            return Err("Photo image data cannot be empty when present".to_string());
        }

        Ok(())
    }
}

impl<'r> FromRow<'r, SqliteRow> for Photo {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: PhotoId(decode_uuid(row, "id")?),
            pin_id: PinId(decode_uuid(row, "pin_id")?),
            image_url: row.try_get("image_url")?,
            image_data: row.try_get("image_data")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
