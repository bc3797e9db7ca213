use common::{now_secs, Collection, Record};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{required_field, Catalog, CatalogError};

#[derive(Clone, Debug, Serialize)]
pub struct AddOutcome {
    pub collection: Collection,
    pub already_exists: bool,
}

impl Catalog {
    pub fn create_collection(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Collection, CatalogError> {
        let name = required_field(name, "name")?;
        let collection = self.store.create_collection(owner, name)?;
        info!(collection_id = %collection.id, owner, "collection created");
        Ok(collection)
    }

    pub fn list_collections(&self, owner: &str) -> Result<Vec<Collection>, CatalogError> {
        Ok(self.store.list_collections(owner)?)
    }

    /// Loads a collection, hiding collections that belong to someone else.
    pub fn get_collection(
        &self,
        owner: &str,
        collection_id: &str,
    ) -> Result<Collection, CatalogError> {
        match self.store.get_collection(collection_id)? {
            Some(collection) if collection.owner == owner => Ok(collection),
            _ => Err(collection_not_found()),
        }
    }

    pub fn collection_records(
        &self,
        collection: &Collection,
    ) -> Result<Vec<Record>, CatalogError> {
        Ok(self.store.get_records(&collection.records)?)
    }

    pub fn rename_collection(
        &self,
        owner: &str,
        collection_id: &str,
        name: &str,
    ) -> Result<Collection, CatalogError> {
        let name = required_field(name, "name")?;
        let mut collection = self.get_collection(owner, collection_id)?;
        collection.name = name;
        self.persist(&mut collection)?;
        Ok(collection)
    }

    pub fn delete_collection(
        &self,
        owner: &str,
        collection_id: &str,
    ) -> Result<(), CatalogError> {
        let collection = self.get_collection(owner, collection_id)?;
        if self.store.delete_collection(&collection.id)? {
            info!(collection_id, owner, "collection deleted");
            Ok(())
        } else {
            Err(collection_not_found())
        }
    }

    /// Appends `record_id` and regenerates the collection metadata.
    ///
    /// Adding a record that is already present is not an error: the
    /// collection comes back unchanged with `already_exists` set. A failed
    /// metadata generation keeps the previous description and tags.
    pub async fn add_record(
        &self,
        owner: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<AddOutcome, CatalogError> {
        let mut collection = self.get_collection(owner, collection_id)?;
        if collection.contains_record(record_id) {
            return Ok(AddOutcome {
                collection,
                already_exists: true,
            });
        }
        if self.store.get_record(record_id)?.is_none() {
            return Err(CatalogError::NotFound("record not found".to_string()));
        }

        collection.records.push(record_id.to_string());
        let genres = collection.known_genres();
        let moods = collection.known_moods();
        self.refresh_metadata(&mut collection, &genres, &moods).await?;
        self.persist(&mut collection)?;
        info!(collection_id, record_id, records = collection.records.len(), "record added");
        Ok(AddOutcome {
            collection,
            already_exists: false,
        })
    }

    /// Removes `record_id`. An emptied collection has its metadata cleared
    /// without consulting the model.
    pub async fn remove_record(
        &self,
        owner: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<Collection, CatalogError> {
        let mut collection = self.get_collection(owner, collection_id)?;
        if !collection.contains_record(record_id) {
            return Err(CatalogError::NotFound(
                "record not found in collection".to_string(),
            ));
        }

        collection.records.retain(|id| id != record_id);
        if collection.records.is_empty() {
            collection.clear_metadata();
        } else {
            self.refresh_metadata(&mut collection, &[], &[]).await?;
        }
        self.persist(&mut collection)?;
        info!(collection_id, record_id, records = collection.records.len(), "record removed");
        Ok(collection)
    }

    async fn refresh_metadata(
        &self,
        collection: &mut Collection,
        existing_genres: &[String],
        existing_moods: &[String],
    ) -> Result<(), CatalogError> {
        let records = self.store.get_records(&collection.records)?;
        match self
            .collections
            .generate(&records, existing_genres, existing_moods)
            .await
        {
            Ok(generated) => {
                debug!(collection_id = %collection.id, "collection metadata regenerated");
                collection.description = generated.description;
                collection.genre = generated.genres.to_vec();
                collection.mood = generated.moods.to_vec();
            }
            Err(err) => {
                warn!(
                    collection_id = %collection.id,
                    error = %err,
                    "collection metadata generation failed; keeping previous metadata"
                );
            }
        }
        Ok(())
    }

    fn persist(&self, collection: &mut Collection) -> Result<(), CatalogError> {
        collection.updated_at = now_secs();
        if self.store.save_collection(collection)? {
            Ok(())
        } else {
            Err(collection_not_found())
        }
    }
}

fn collection_not_found() -> CatalogError {
    CatalogError::NotFound("collection not found".to_string())
}
