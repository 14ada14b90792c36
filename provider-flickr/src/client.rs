//! Flickr API Client
//!
//! ## API Endpoint
//!
//! - **Photo search**: `https://api.flickr.com/services/rest?method=flickr.photos.search&api_key={key}&bbox={bbox}&safe_search=1&extras=url_m&format=json&nojsoncallback=1&per_page=12[&page={n}]`
//!
//! ## Random-page protocol
//!
//! Flickr only serves roughly the first 4000 results of a query; deeper pages
//! repeat earlier photos. A search therefore runs in two steps:
//!
//! 1. query without `page` to learn `pages` (the total page count);
//! 2. pick a page uniformly in `[1, min(pages, 4000 / 12)]` and query it.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::FlickrApiConfig;
//! use provider_flickr::{FlickrClient, ImageSearchClient};
//! use std::sync::Arc;
//!
//! let client = FlickrClient::new(http_client, FlickrApiConfig::new("your_api_key"));
//! let descriptors = client.search_random_photos(40.0, -74.0).await?;
//! let bytes = client.download_image_bytes(&descriptors[0].medium_url).await?;
//! ```

use crate::error::{ApiError, Result};
use crate::types::{parse_search_body, BoundingBox, PhotoDescriptor, SearchPage};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::FlickrApiConfig;
use core_runtime::logging::redact_url;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Results requested per page
pub const RESULTS_PER_PAGE: u32 = 12;

/// Flickr stops returning unique results after roughly this many photos
pub const MAX_TOTAL_RESULTS: u32 = 4000;

const SEARCH_METHOD: &str = "flickr.photos.search";

/// Photo search and image download, abstracted for injection and mocking.
#[async_trait]
pub trait ImageSearchClient: Send + Sync {
    /// Fetch one page of photos around a coordinate.
    ///
    /// With `page == None` Flickr returns its first page; callers use this to
    /// learn `total_pages`.
    async fn search_photo_page(
        &self,
        latitude: f64,
        longitude: f64,
        page: Option<u32>,
    ) -> Result<SearchPage>;

    /// Run the random-page protocol and return the chosen page's photos.
    ///
    /// # Errors
    /// `NoResults` when the area has no photos or the chosen page is empty,
    /// plus every error of [`search_photo_page`](Self::search_photo_page).
    async fn search_random_photos(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<PhotoDescriptor>>;

    /// GET an absolute image URL and return its bytes.
    async fn download_image_bytes(&self, url: &str) -> Result<Bytes>;
}

/// Highest page worth requesting for a query with `total_pages` pages.
pub fn page_limit(total_pages: u32) -> u32 {
    total_pages.min(MAX_TOTAL_RESULTS / RESULTS_PER_PAGE)
}

/// Uniform page number in `[1, page_limit]`.
///
/// A limit of zero is treated as one.
pub fn pick_random_page<R: Rng + ?Sized>(rng: &mut R, page_limit: u32) -> u32 {
    rng.gen_range(1..=page_limit.max(1))
}

/// Build the `flickr.photos.search` URL for a bounding box.
pub fn build_search_url(
    base_url: &str,
    api_key: &str,
    bbox: &BoundingBox,
    page: Option<u32>,
) -> String {
    let mut url = format!(
        "{}?method={}&api_key={}&bbox={}&safe_search=1&extras=url_m&format=json&nojsoncallback=1&per_page={}",
        base_url,
        SEARCH_METHOD,
        urlencoding::encode(api_key),
        urlencoding::encode(&bbox.to_string()),
        RESULTS_PER_PAGE
    );

    if let Some(page) = page {
        url.push_str(&format!("&page={}", page));
    }

    url
}

/// Flickr implementation of [`ImageSearchClient`].
pub struct FlickrClient {
    http_client: Arc<dyn HttpClient>,
    config: FlickrApiConfig,
    rng: Mutex<StdRng>,
}

impl FlickrClient {
    /// Seeds page selection from `config.random_seed`, or from OS entropy
    /// when no seed is configured.
    pub fn new(http_client: Arc<dyn HttpClient>, config: FlickrApiConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            http_client,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Replace the page-selection generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn config(&self) -> &FlickrApiConfig {
        &self.config
    }

    fn bounding_box(&self, latitude: f64, longitude: f64) -> BoundingBox {
        BoundingBox::around(
            latitude,
            longitude,
            self.config.bbox_half_width,
            self.config.bbox_half_height,
        )
    }

    fn next_page(&self, limit: u32) -> u32 {
        // A poisoned lock only means another caller panicked mid-draw; the
        // generator state is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pick_random_page(&mut *rng, limit)
    }

    /// Host bridges may echo the request URL in their error text.
    fn scrub_api_key(&self, message: String) -> String {
        let key = &self.config.api_key;
        if key.is_empty() {
            return message;
        }
        message
            .replace(urlencoding::encode(key).as_ref(), "[REDACTED]")
            .replace(key.as_str(), "[REDACTED]")
    }

    async fn get(&self, url: String, accept: &str) -> Result<HttpResponse> {
        let request = HttpRequest::new(HttpMethod::Get, url)
            .header("Accept", accept)
            .timeout(self.config.request_timeout);

        let response = self.http_client.execute(request).await.map_err(|e| {
            let error = ApiError::Transport(self.scrub_api_key(e.to_string()));
            warn!(error = %error, "Flickr request failed");
            error
        })?;

        if !response.is_success() {
            warn!(status = response.status, "Flickr returned a non-success status");
            return Err(ApiError::BadStatus {
                status: response.status,
            });
        }

        if response.body.is_empty() {
            return Err(ApiError::EmptyBody);
        }

        Ok(response)
    }

    /// Pick one photo uniformly from a random result page.
    pub async fn search_random_photo(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<PhotoDescriptor> {
        let mut descriptors = self.search_random_photos(latitude, longitude).await?;
        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(0..descriptors.len())
        };
        Ok(descriptors.swap_remove(index))
    }
}

#[async_trait]
impl ImageSearchClient for FlickrClient {
    #[instrument(skip(self))]
    async fn search_photo_page(
        &self,
        latitude: f64,
        longitude: f64,
        page: Option<u32>,
    ) -> Result<SearchPage> {
        let bbox = self.bounding_box(latitude, longitude);
        let url = build_search_url(&self.config.base_url, &self.config.api_key, &bbox, page);

        debug!(url = %redact_url(&url), "Querying Flickr photo search");

        let response = self.get(url, "application/json").await?;
        let result = parse_search_body(&response.body, page.is_some())?;

        debug!(
            total_pages = result.total_pages,
            photos = result.descriptors.len(),
            "Flickr search page parsed"
        );
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn search_random_photos(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<PhotoDescriptor>> {
        let first = self.search_photo_page(latitude, longitude, None).await?;

        if first.total_pages == 0 {
            info!("No Flickr photos in this area");
            return Err(ApiError::NoResults { page: 0 });
        }

        let limit = page_limit(first.total_pages);
        let page = self.next_page(limit);
        debug!(total_pages = first.total_pages, limit, page, "Selected random page");

        let chosen = self.search_photo_page(latitude, longitude, Some(page)).await?;

        if chosen.is_empty() {
            info!(page, "Chosen Flickr page has no usable photos");
            return Err(ApiError::NoResults { page });
        }

        Ok(chosen.descriptors)
    }

    async fn download_image_bytes(&self, url: &str) -> Result<Bytes> {
        debug!(url = %redact_url(url), "Downloading image");

        let response = self.get(url.to_string(), "image/*").await?;
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorKind;
    use bridge_traits::error::BridgeError;
    use mockall::{mock, Sequence};
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn page_body(pages: u32, urls: &[&str]) -> String {
        let photos: Vec<String> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| format!(r#"{{"id":"{i}","title":"photo {i}","url_m":"{url}"}}"#))
            .collect();
        format!(
            r#"{{"photos":{{"page":1,"pages":{pages},"perpage":12,"total":"{}","photo":[{}]}},"stat":"ok"}}"#,
            pages * 12,
            photos.join(",")
        )
    }

    fn config() -> FlickrApiConfig {
        FlickrApiConfig::new("test-key").with_base_url("https://flickr.test/rest")
    }

    fn client_with(mock: MockHttpClient, seed: u64) -> FlickrClient {
        FlickrClient::new(Arc::new(mock), config().with_random_seed(seed))
    }

    fn is_page_request(request: &HttpRequest) -> bool {
        request.url.contains("&page=")
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(page_limit(1000), 333);
        assert_eq!(page_limit(333), 333);
        assert_eq!(page_limit(10), 10);
        assert_eq!(page_limit(0), 0);
    }

    #[test]
    fn test_pick_random_page_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for limit in [1, 2, 5, 333] {
            for _ in 0..200 {
                let page = pick_random_page(&mut rng, limit);
                assert!((1..=limit).contains(&page), "page {page} outside 1..={limit}");
            }
        }
        assert_eq!(pick_random_page(&mut rng, 0), 1);
    }

    #[test]
    fn test_seeded_page_is_reproducible() {
        let first = pick_random_page(&mut StdRng::seed_from_u64(7), page_limit(5));
        assert_eq!(first, 3);
        assert_eq!(pick_random_page(&mut StdRng::seed_from_u64(7), page_limit(5)), first);
    }

    #[test]
    fn test_build_search_url() {
        let bbox = BoundingBox::around(40.0, -74.0, 1.0, 1.0);
        let url = build_search_url("https://api.flickr.com/services/rest", "k&y", &bbox, None);

        assert!(url.starts_with("https://api.flickr.com/services/rest?method=flickr.photos.search"));
        assert!(url.contains("api_key=k%26y"));
        assert!(url.contains("bbox=-75%2C39%2C-73%2C41"));
        assert!(url.contains("safe_search=1"));
        assert!(url.contains("extras=url_m"));
        assert!(url.contains("format=json"));
        assert!(url.contains("nojsoncallback=1"));
        assert!(url.contains("per_page=12"));
        assert!(!url.contains("&page="));

        let url = build_search_url("https://api.flickr.com/services/rest", "k", &bbox, Some(3));
        assert!(url.ends_with("&page=3"));
    }

    #[tokio::test]
    async fn test_search_random_photos_requests_seeded_page() {
        let expected_page = pick_random_page(&mut StdRng::seed_from_u64(42), page_limit(5));
        let mut seq = Sequence::new();
        let mut mock = MockHttpClient::new();

        mock.expect_execute()
            .withf(|req| !is_page_request(req) && req.url.contains("api_key=test-key"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, &page_body(5, &[]))));

        mock.expect_execute()
            .withf(move |req| req.url.ends_with(&format!("&page={expected_page}")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    &page_body(5, &["https://img.test/a_m.jpg", "https://img.test/b_m.jpg"]),
                ))
            });

        let client = client_with(mock, 42);
        let descriptors = client.search_random_photos(40.0, -74.0).await.unwrap();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].medium_url, "https://img.test/a_m.jpg");
    }

    #[tokio::test]
    async fn test_search_random_photos_caps_page_at_limit() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| !is_page_request(req))
            .times(1)
            .returning(|_| Ok(response(200, &page_body(100_000, &[]))));
        mock.expect_execute()
            .withf(|req| {
                let page: u32 = req
                    .url
                    .rsplit("&page=")
                    .next()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0);
                (1..=333).contains(&page)
            })
            .times(1)
            .returning(|_| Ok(response(200, &page_body(100_000, &["https://img.test/x_m.jpg"]))));

        let client = client_with(mock, 9);
        assert_eq!(client.search_random_photos(0.0, 0.0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_pages_short_circuits() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, &page_body(0, &[]))));

        let client = client_with(mock, 1);
        let err = client.search_random_photos(0.0, 0.0).await.unwrap_err();
        assert_eq!(err, ApiError::NoResults { page: 0 });
    }

    #[tokio::test]
    async fn test_empty_chosen_page_is_no_results() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(2)
            .returning(|_| Ok(response(200, &page_body(1, &[]))));

        let client = client_with(mock, 1);
        let err = client.search_random_photos(0.0, 0.0).await.unwrap_err();
        assert_eq!(err, ApiError::NoResults { page: 1 });
    }

    #[tokio::test]
    async fn test_remote_error_stops_after_first_request() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{"stat":"fail","code":100,"message":"Invalid API Key"}"#,
            ))
        });

        let client = client_with(mock, 1);
        let err = client.search_random_photos(0.0, 0.0).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::RemoteError {
                code: 100,
                message: "Invalid API Key".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_transport_error_does_not_carry_api_key() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|req| {
            Err(BridgeError::Network(format!(
                "Connection failed: error sending request for url ({})",
                req.url
            )))
        });

        let client = client_with(mock, 1);
        let err = client.search_random_photos(40.0, -74.0).await.unwrap_err();

        assert_eq!(err.kind(), ApiErrorKind::Transport);
        let text = err.to_string();
        assert!(!text.contains("test-key"), "key leaked: {text}");
        assert!(text.contains("api_key=[REDACTED]"));
    }

    #[tokio::test]
    async fn test_search_page_error_mapping() {
        let cases: Vec<(bridge_traits::error::Result<HttpResponse>, ApiErrorKind)> = vec![
            (
                Err(BridgeError::Network("Request timed out".to_string())),
                ApiErrorKind::Transport,
            ),
            (Ok(response(500, "oops")), ApiErrorKind::BadStatus),
            (Ok(response(200, "")), ApiErrorKind::EmptyBody),
            (Ok(response(200, "{not json")), ApiErrorKind::MalformedJson),
            (Ok(response(200, r#"{"stat":"ok"}"#)), ApiErrorKind::MissingField),
        ];

        for (outcome, expected) in cases {
            let mut mock = MockHttpClient::new();
            let outcome = Mutex::new(Some(outcome));
            mock.expect_execute().times(1).returning(move |_| {
                outcome
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| Err(BridgeError::OperationFailed("called twice".into())))
            });

            let client = client_with(mock, 1);
            let err = client.search_photo_page(1.0, 1.0, Some(1)).await.unwrap_err();
            assert_eq!(err.kind(), expected, "unexpected error {err:?}");
        }
    }

    #[tokio::test]
    async fn test_request_carries_timeout_and_accept_header() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| {
                req.timeout == Some(std::time::Duration::from_secs(30))
                    && req.headers.get("Accept").map(String::as_str) == Some("application/json")
            })
            .times(1)
            .returning(|_| Ok(response(200, &page_body(3, &["https://img.test/a_m.jpg"]))));

        let client = client_with(mock, 1);
        let page = client.search_photo_page(1.0, 1.0, Some(2)).await.unwrap();
        assert_eq!(page.total_pages, 3);
    }

    #[tokio::test]
    async fn test_download_image_bytes() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url == "https://img.test/a_m.jpg")
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
                })
            });

        let client = client_with(mock, 1);
        let bytes = client.download_image_bytes("https://img.test/a_m.jpg").await.unwrap();
        assert_eq!(&bytes[..], &[0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn test_download_errors() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(404, "not found")));
        let client = client_with(mock, 1);
        assert_eq!(
            client.download_image_bytes("https://img.test/gone.jpg").await,
            Err(ApiError::BadStatus { status: 404 })
        );

        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, "")));
        let client = client_with(mock, 1);
        assert_eq!(
            client.download_image_bytes("https://img.test/empty.jpg").await,
            Err(ApiError::EmptyBody)
        );
    }

    #[tokio::test]
    async fn test_search_random_photo_returns_member_of_page() {
        let urls = ["https://img.test/a_m.jpg", "https://img.test/b_m.jpg", "https://img.test/c_m.jpg"];
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(2)
            .returning(move |_| Ok(response(200, &page_body(1, &urls))));

        let client = client_with(mock, 3);
        let photo = client.search_random_photo(10.0, 10.0).await.unwrap();
        assert!(urls.contains(&photo.medium_url.as_str()));
    }
}
