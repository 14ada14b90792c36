//! Pin and photo repository trait and SQLite implementation

use crate::error::{LibraryError, Result};
use crate::models::{validate_coordinate, Photo, PhotoId, Pin, PinId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use tracing::{debug, instrument, warn};

/// Persistent cache of pins and their photos.
///
/// Every mutating call runs in its own transaction and is committed before it
/// returns. Reads issued after a successful mutation observe its effect.
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert a pin at the given coordinate.
    ///
    /// # Errors
    /// `InvalidInput` when the coordinate is outside the global range.
    async fn create_pin(&self, latitude: f64, longitude: f64) -> Result<Pin>;

    /// All pins, oldest first.
    async fn list_pins(&self) -> Result<Vec<Pin>>;

    /// Pin whose stored coordinate equals the given one exactly.
    async fn find_pin(&self, latitude: f64, longitude: f64) -> Result<Option<Pin>>;

    async fn get_pin(&self, id: &PinId) -> Result<Option<Pin>>;

    async fn get_photo(&self, id: &PhotoId) -> Result<Option<Photo>>;

    /// Photos of a pin in insertion order.
    async fn list_photos(&self, pin_id: &PinId) -> Result<Vec<Photo>>;

    /// Create one photo per URL, all without image data, in one transaction.
    ///
    /// # Errors
    /// `NotFound` if the pin does not exist (or is deleted concurrently);
    /// nothing is inserted in that case.
    async fn create_photos(&self, pin_id: &PinId, urls: &[String]) -> Result<Vec<Photo>>;

    /// Store downloaded bytes on a photo.
    ///
    /// # Errors
    /// `NotFound` if the photo no longer exists.
    async fn set_photo_data(&self, photo_id: &PhotoId, data: &[u8]) -> Result<()>;

    /// Delete one photo.
    ///
    /// # Returns
    /// - `Ok(true)` if the photo was deleted
    /// - `Ok(false)` if it did not exist
    async fn delete_photo(&self, photo_id: &PhotoId) -> Result<bool>;

    /// Delete every photo of a pin in one statement. Returns the count removed.
    async fn delete_all_photos(&self, pin_id: &PinId) -> Result<u64>;

    /// Delete a pin; its photos are removed with it.
    async fn delete_pin(&self, pin_id: &PinId) -> Result<bool>;

    /// Flush committed changes to the database file.
    ///
    /// # Errors
    /// `PersistFailure` if the store cannot be written.
    async fn commit(&self) -> Result<()>;

    async fn count_photos(&self, pin_id: &PinId) -> Result<i64>;
}

/// SQLite implementation of PhotoRepository
pub struct SqlitePhotoRepository {
    pool: SqlitePool,
}

impl SqlitePhotoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl PhotoRepository for SqlitePhotoRepository {
    #[instrument(skip(self))]
    async fn create_pin(&self, latitude: f64, longitude: f64) -> Result<Pin> {
        validate_coordinate(latitude, longitude).map_err(|message| {
            LibraryError::InvalidInput {
                field: "Pin".to_string(),
                message,
            }
        })?;

        let pin = Pin::new(latitude, longitude);

        query("INSERT INTO pins (id, latitude, longitude, created_at) VALUES (?, ?, ?, ?)")
            .bind(pin.id.to_string())
            .bind(pin.latitude)
            .bind(pin.longitude)
            .bind(pin.created_at)
            .execute(&self.pool)
            .await?;

        debug!(pin_id = %pin.id, "Pin created");
        Ok(pin)
    }

    async fn list_pins(&self) -> Result<Vec<Pin>> {
        let pins = query_as::<_, Pin>("SELECT * FROM pins ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await?;

        Ok(pins)
    }

    async fn find_pin(&self, latitude: f64, longitude: f64) -> Result<Option<Pin>> {
        let pin = query_as::<_, Pin>(
            "SELECT * FROM pins WHERE latitude = ? AND longitude = ? ORDER BY rowid LIMIT 1",
        )
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await?;

        Ok(pin)
    }

    async fn get_pin(&self, id: &PinId) -> Result<Option<Pin>> {
        let pin = query_as::<_, Pin>("SELECT * FROM pins WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(pin)
    }

    async fn get_photo(&self, id: &PhotoId) -> Result<Option<Photo>> {
        let photo = query_as::<_, Photo>("SELECT * FROM photos WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(photo)
    }

    async fn list_photos(&self, pin_id: &PinId) -> Result<Vec<Photo>> {
        let photos = query_as::<_, Photo>("SELECT * FROM photos WHERE pin_id = ? ORDER BY rowid")
            .bind(pin_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        Ok(photos)
    }

    #[instrument(skip(self, urls), fields(count = urls.len()))]
    async fn create_photos(&self, pin_id: &PinId, urls: &[String]) -> Result<Vec<Photo>> {
        let photos: Vec<Photo> = urls.iter().map(|url| Photo::new(*pin_id, url)).collect();

        for photo in &photos {
            photo.validate().map_err(|message| LibraryError::InvalidInput {
                field: "Photo".to_string(),
                message,
            })?;
        }

        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = query_as("SELECT 1 FROM pins WHERE id = ?")
            .bind(pin_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        if exists.is_none() {
            return Err(LibraryError::pin_not_found(pin_id));
        }

        for photo in &photos {
            let inserted = query(
                r#"
                INSERT INTO photos (id, pin_id, image_url, image_data, created_at)
                VALUES (?, ?, ?, NULL, ?)
                "#,
            )
            .bind(photo.id.to_string())
            .bind(photo.pin_id.to_string())
            .bind(&photo.image_url)
            .bind(photo.created_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(e) if is_foreign_key_violation(&e) => {
                    warn!(pin_id = %pin_id, "Pin disappeared while inserting photos");
                    return Err(LibraryError::pin_not_found(pin_id));
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;

        debug!(pin_id = %pin_id, count = photos.len(), "Photos created");
        Ok(photos)
    }

    async fn set_photo_data(&self, photo_id: &PhotoId, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "image_data".to_string(),
                message: "Image data cannot be empty".to_string(),
            });
        }

        let result = query("UPDATE photos SET image_data = ? WHERE id = ?")
            .bind(data)
            .bind(photo_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::photo_not_found(photo_id));
        }

        Ok(())
    }

    async fn delete_photo(&self, photo_id: &PhotoId) -> Result<bool> {
        let result = query("DELETE FROM photos WHERE id = ?")
            .bind(photo_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_photos(&self, pin_id: &PinId) -> Result<u64> {
        let result = query("DELETE FROM photos WHERE pin_id = ?")
            .bind(pin_id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(pin_id = %pin_id, removed = result.rows_affected(), "Photos of pin deleted");
        Ok(result.rows_affected())
    }

    async fn delete_pin(&self, pin_id: &PinId) -> Result<bool> {
        let result = query("DELETE FROM pins WHERE id = ?")
            .bind(pin_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(&self) -> Result<()> {
        // Non-WAL databases answer with (0, -1, -1); only a failed statement is an error.
        query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to checkpoint database");
                LibraryError::PersistFailure(e)
            })?;

        Ok(())
    }

    async fn count_photos(&self, pin_id: &PinId) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM photos WHERE pin_id = ?")
            .bind(pin_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
