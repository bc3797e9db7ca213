use common::{now_secs, Record};
use metadata::AlbumMetadata;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{required_field, Catalog, CatalogError};

/// Payload for [`Catalog::ensure_record`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub external_catalog_id: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl Catalog {
    /// Returns the record for `external_catalog_id`, creating and enriching
    /// it on first sight. Existing records are returned untouched.
    pub async fn ensure_record(&self, input: NewRecord) -> Result<Record, CatalogError> {
        let name = required_field(&input.name, "name")?;
        let artist = required_field(&input.artist, "artist")?;
        let external_catalog_id =
            required_field(&input.external_catalog_id, "external_catalog_id")?;

        if let Some(existing) = self.store.find_record_by_external_id(&external_catalog_id)? {
            return Ok(existing);
        }

        let generated = match self.albums.generate(&name, &artist).await {
            Ok(generated) => generated,
            Err(err) => {
                warn!(
                    external_catalog_id = %external_catalog_id,
                    error = %err,
                    "album metadata generation failed; using fallback"
                );
                AlbumMetadata::fallback(&artist)
            }
        };

        let now = now_secs();
        let record = Record {
            id: Uuid::new_v4().to_string(),
            name,
            artist,
            image: input
                .image
                .map(|image| image.trim().to_string())
                .filter(|image| !image.is_empty()),
            genre: generated.genre,
            mood: generated.mood,
            year: generated.year,
            description: generated.description,
            external_catalog_id,
            created_at: now,
            updated_at: now,
        };
        let (record, inserted) = self.store.insert_record_unique(record)?;
        if inserted {
            info!(
                record_id = %record.id,
                external_catalog_id = %record.external_catalog_id,
                "record created"
            );
        }
        Ok(record)
    }

    pub fn get_record(&self, record_id: &str) -> Result<Record, CatalogError> {
        self.store
            .get_record(record_id)?
            .ok_or_else(|| CatalogError::NotFound("record not found".to_string()))
    }
}
