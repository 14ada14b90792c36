//! Pin photo service
//!
//! Coordinates the image search client and the photo repository: serves a
//! pin's photos from the local cache, fetches a random batch from Flickr when
//! the cache is empty, and downloads image bytes on demand.
//!
//! Every committed mutation is announced on the [`EventBus`] so the UI can
//! refresh the map or the album.

use bytes::Bytes;
use core_library::{LibraryError, Photo, PhotoId, PhotoRepository, Pin, PinId};
use core_runtime::events::{CoreEvent, EventBus, FetchEvent, LibraryEvent};
use futures::future::FutureExt;
use provider_flickr::ImageSearchClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ServiceError};
use crate::inflight::{DownloadRegistry, InFlightPins};

/// Where the photos of a [`PhotoBatch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotoSource {
    /// Already stored for the pin; no network call was made.
    Cache,
    /// Created from a fresh search.
    Network,
}

/// Photos of one pin in insertion order.
#[derive(Debug, Clone)]
pub struct PhotoBatch {
    pub pin_id: PinId,
    pub photos: Vec<Photo>,
    pub source: PhotoSource,
}

impl PhotoBatch {
    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }
}

/// Photo acquisition and caching for pins.
///
/// Cloning yields another handle onto the same in-flight state.
#[derive(Clone)]
pub struct PinPhotoService {
    client: Arc<dyn ImageSearchClient>,
    repository: Arc<dyn PhotoRepository>,
    events: Arc<EventBus>,
    fetching: InFlightPins,
    downloads: DownloadRegistry,
}

impl PinPhotoService {
    pub fn new(
        client: Arc<dyn ImageSearchClient>,
        repository: Arc<dyn PhotoRepository>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            client,
            repository,
            events,
            fetching: InFlightPins::default(),
            downloads: DownloadRegistry::default(),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn repository(&self) -> Arc<dyn PhotoRepository> {
        Arc::clone(&self.repository)
    }

    /// Whether a network fetch for the pin is running.
    pub fn is_fetching(&self, pin_id: &PinId) -> bool {
        self.fetching.contains(pin_id)
    }

    /// Number of image downloads currently in progress.
    pub fn pending_downloads(&self) -> usize {
        self.downloads.len()
    }

    // ------------------------------------------------------------------
    // Pins
    // ------------------------------------------------------------------

    pub async fn create_pin(&self, latitude: f64, longitude: f64) -> Result<Pin> {
        let pin = self.repository.create_pin(latitude, longitude).await?;
        self.repository.commit().await?;

        info!(pin_id = %pin.id, latitude, longitude, "Pin created");
        emit(&self.events, CoreEvent::Library(LibraryEvent::PinsChanged));
        Ok(pin)
    }

    pub async fn list_pins(&self) -> Result<Vec<Pin>> {
        Ok(self.repository.list_pins().await?)
    }

    /// Delete a pin together with its photos. Returns `false` if it was
    /// already gone.
    pub async fn delete_pin(&self, pin_id: &PinId) -> Result<bool> {
        let deleted = self.repository.delete_pin(pin_id).await?;
        if !deleted {
            return Ok(false);
        }

        self.repository.commit().await?;
        info!(pin_id = %pin_id, "Pin deleted");
        emit(&self.events, CoreEvent::Library(LibraryEvent::PinsChanged));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Photos
    // ------------------------------------------------------------------

    /// Photos of the pin, fetched from Flickr only when none are stored.
    ///
    /// # Errors
    ///
    /// - `AlreadyInFlight` if a fetch for this pin is running
    /// - `PinGone` if the pin does not exist or is deleted mid-fetch
    /// - `Search` when the search fails; nothing is stored in that case
    #[instrument(skip_all, fields(pin_id = %pin_id))]
    pub async fn load_photos(&self, pin_id: &PinId) -> Result<PhotoBatch> {
        let cached = self.repository.list_photos(pin_id).await?;
        if !cached.is_empty() {
            debug!(count = cached.len(), "Serving photos from cache");
            return Ok(PhotoBatch {
                pin_id: *pin_id,
                photos: cached,
                source: PhotoSource::Cache,
            });
        }

        let _guard = self
            .fetching
            .try_acquire(*pin_id)
            .ok_or(ServiceError::AlreadyInFlight { pin_id: *pin_id })?;

        // Another fetch may have filled the cache between the read and the acquire.
        let cached = self.repository.list_photos(pin_id).await?;
        if !cached.is_empty() {
            return Ok(PhotoBatch {
                pin_id: *pin_id,
                photos: cached,
                source: PhotoSource::Cache,
            });
        }

        self.fetch_new_photos(pin_id).await
    }

    /// Replace all photos of the pin with a fresh random batch.
    ///
    /// The old photos are deleted and committed before the search starts, so
    /// old and new photos are never stored together. If the search fails the
    /// pin is left with no photos.
    #[instrument(skip_all, fields(pin_id = %pin_id))]
    pub async fn refresh_photos(&self, pin_id: &PinId) -> Result<PhotoBatch> {
        let _guard = self
            .fetching
            .try_acquire(*pin_id)
            .ok_or(ServiceError::AlreadyInFlight { pin_id: *pin_id })?;

        let removed = self.repository.delete_all_photos(pin_id).await?;
        self.repository.commit().await?;

        if removed > 0 {
            debug!(removed, "Discarded previous collection");
            emit(&self.events, photos_changed(pin_id));
        }

        self.fetch_new_photos(pin_id).await
    }

    /// Delete one photo. Returns `false` if it was already gone.
    pub async fn delete_photo(&self, photo: &Photo) -> Result<bool> {
        let deleted = self.repository.delete_photo(&photo.id).await?;
        if !deleted {
            return Ok(false);
        }

        self.repository.commit().await?;
        emit(&self.events, photos_changed(&photo.pin_id));
        Ok(true)
    }

    /// Image bytes for a photo, downloading and storing them when absent.
    ///
    /// Concurrent calls for the same photo share one download.
    pub async fn ensure_photo_bytes(&self, photo: &Photo) -> Result<Bytes> {
        if let Some(data) = &photo.image_data {
            return Ok(Bytes::copy_from_slice(data));
        }

        let download = self.downloads.join_or_start(photo.id, || {
            download_and_store(
                Arc::clone(&self.client),
                Arc::clone(&self.repository),
                Arc::clone(&self.events),
                photo.id,
                photo.pin_id,
                photo.image_url.clone(),
            )
            .map(|result| result.map_err(Arc::new))
            .boxed()
        });

        download.await.map_err(ServiceError::from_shared)
    }

    async fn fetch_new_photos(&self, pin_id: &PinId) -> Result<PhotoBatch> {
        let pin = self
            .repository
            .get_pin(pin_id)
            .await?
            .ok_or(ServiceError::PinGone { pin_id: *pin_id })?;

        emit(
            &self.events,
            CoreEvent::Fetch(FetchEvent::Started {
                pin_id: pin_id.to_string(),
            }),
        );

        let result = self.search_and_store(&pin).await;

        let event = match &result {
            Ok(photos) => FetchEvent::Completed {
                pin_id: pin_id.to_string(),
                photo_count: photos.len(),
            },
            Err(error) => FetchEvent::Failed {
                pin_id: pin_id.to_string(),
                message: error
                    .api_error()
                    .map(|api| api.user_message().to_string())
                    .unwrap_or_else(|| error.to_string()),
                no_results: error.api_error().is_some_and(|api| api.is_no_results()),
            },
        };
        emit(&self.events, CoreEvent::Fetch(event));

        let photos = result?;
        emit(&self.events, photos_changed(pin_id));

        Ok(PhotoBatch {
            pin_id: *pin_id,
            photos,
            source: PhotoSource::Network,
        })
    }

    async fn search_and_store(&self, pin: &Pin) -> Result<Vec<Photo>> {
        let descriptors = self
            .client
            .search_random_photos(pin.latitude, pin.longitude)
            .await
            .map_err(|source| {
                warn!(pin_id = %pin.id, error = %source, "Photo search failed");
                ServiceError::Search {
                    pin_id: pin.id,
                    source,
                }
            })?;

        let urls: Vec<String> = descriptors.into_iter().map(|d| d.medium_url).collect();

        let photos = match self.repository.create_photos(&pin.id, &urls).await {
            Ok(photos) => photos,
            Err(error) if error.is_not_found() => {
                warn!(pin_id = %pin.id, "Pin deleted during fetch; discarding results");
                return Err(ServiceError::PinGone { pin_id: pin.id });
            }
            Err(error) => return Err(error.into()),
        };

        self.repository.commit().await?;
        info!(pin_id = %pin.id, count = photos.len(), "Stored new photo collection");
        Ok(photos)
    }
}

async fn download_and_store(
    client: Arc<dyn ImageSearchClient>,
    repository: Arc<dyn PhotoRepository>,
    events: Arc<EventBus>,
    photo_id: PhotoId,
    pin_id: PinId,
    image_url: String,
) -> Result<Bytes> {
    // The caller's snapshot may be stale; another download may have finished.
    let stored = repository.get_photo(&photo_id).await?.ok_or_else(|| {
        ServiceError::Repository(LibraryError::NotFound {
            entity_type: "Photo".to_string(),
            id: photo_id.to_string(),
        })
    })?;

    if let Some(data) = stored.image_data {
        return Ok(Bytes::from(data));
    }

    let bytes = client
        .download_image_bytes(&image_url)
        .await
        .map_err(|error| {
            warn!(photo_id = %photo_id, error = %error, "Image download failed");
            ServiceError::Download(error)
        })?;

    match repository.set_photo_data(&photo_id, &bytes).await {
        Ok(()) => {
            repository.commit().await?;
            debug!(photo_id = %photo_id, size = bytes.len(), "Image bytes stored");
            emit(&events, photos_changed(&pin_id));
        }
        Err(error) if error.is_not_found() => {
            debug!(photo_id = %photo_id, "Photo deleted during download; bytes not stored");
        }
        Err(error) => return Err(error.into()),
    }

    Ok(bytes)
}

fn photos_changed(pin_id: &PinId) -> CoreEvent {
    CoreEvent::Library(LibraryEvent::PhotosChanged {
        pin_id: pin_id.to_string(),
    })
}

fn emit(events: &EventBus, event: CoreEvent) {
    // No subscribers is not an error for the producer.
    events.emit(event).ok();
}
