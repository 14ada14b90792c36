//! Flickr API types and response parsing

use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

const LON_RANGE: (f64, f64) = (-180.0, 180.0);
const LAT_RANGE: (f64, f64) = (-90.0, 90.0);

/// Rectangular search region, clamped to the valid coordinate range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Box extending `half_width` degrees east/west and `half_height`
    /// degrees north/south of the coordinate.
    pub fn around(latitude: f64, longitude: f64, half_width: f64, half_height: f64) -> Self {
        Self {
            min_lon: (longitude - half_width).max(LON_RANGE.0),
            min_lat: (latitude - half_height).max(LAT_RANGE.0),
            max_lon: (longitude + half_width).min(LON_RANGE.1),
            max_lat: (latitude + half_height).min(LAT_RANGE.1),
        }
    }
}

/// Formats as the `bbox` query value: `minLon,minLat,maxLon,maxLat`.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// A photo entry from a search response, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoDescriptor {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Absolute URL of the medium-size rendition (`url_m`)
    pub medium_url: String,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub descriptors: Vec<PhotoDescriptor>,
    pub total_pages: u32,
}

impl SearchPage {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Photo entry as Flickr sends it with `extras=url_m`.
#[derive(Debug, Deserialize)]
struct RawPhoto {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url_m: Option<String>,
}

impl RawPhoto {
    fn into_descriptor(self) -> Option<PhotoDescriptor> {
        let medium_url = self.url_m.filter(|url| !url.trim().is_empty())?;
        Some(PhotoDescriptor {
            id: self.id,
            title: self.title.filter(|title| !title.is_empty()),
            medium_url,
        })
    }
}

/// Body of a `stat: "fail"` response.
#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Flickr reports `pages` as a number, occasionally as a numeric string.
fn page_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a `flickr.photos.search` JSON body.
///
/// `require_photos` demands the `photo` array; the first request of the
/// random-page protocol only needs `pages`.
pub(crate) fn parse_search_body(body: &[u8], require_photos: bool) -> Result<SearchPage> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::MalformedJson(e.to_string()))?;

    let Value::Object(root) = root else {
        return Err(ApiError::MalformedJson(
            "Top-level value is not a JSON object".to_string(),
        ));
    };

    let stat = root
        .get("stat")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::missing("stat"))?;

    if stat != "ok" {
        let failure: FailureBody =
            serde_json::from_value(Value::Object(root.clone())).unwrap_or(FailureBody {
                code: None,
                message: None,
            });
        return Err(ApiError::RemoteError {
            code: failure.code.unwrap_or_default(),
            message: failure
                .message
                .unwrap_or_else(|| format!("stat was '{stat}'")),
        });
    }

    let photos = root
        .get("photos")
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::missing("photos"))?;

    let total_pages = photos
        .get("pages")
        .and_then(page_count)
        .ok_or_else(|| ApiError::missing("pages"))?;

    let entries = match photos.get("photo") {
        Some(Value::Array(entries)) => entries.as_slice(),
        None if !require_photos => &[][..],
        _ => return Err(ApiError::missing("photo")),
    };

    let descriptors: Vec<PhotoDescriptor> = entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<RawPhoto>(entry.clone()).ok())
        .filter_map(RawPhoto::into_descriptor)
        .collect();

    if descriptors.len() < entries.len() {
        debug!(
            skipped = entries.len() - descriptors.len(),
            "Skipped photo entries without a medium URL"
        );
    }

    Ok(SearchPage {
        descriptors,
        total_pages,
    })
}
