use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Earliest release year accepted for a record.
pub const MIN_RECORD_YEAR: i32 = 1900;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    pub external_catalog_id: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A user's named set of records.
///
/// `genre` and `mood` hold the aggregated top tags: empty while the
/// collection has never been described, otherwise at most three slots where
/// `None` marks a slot with no distinct value left to fill it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<Option<String>>,
    #[serde(default)]
    pub mood: Vec<Option<String>>,
    #[serde(default)]
    pub records: Vec<String>,
    pub owner: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Collection {
    pub fn contains_record(&self, record_id: &str) -> bool {
        self.records.iter().any(|id| id == record_id)
    }

    pub fn known_genres(&self) -> Vec<String> {
        self.genre.iter().flatten().cloned().collect()
    }

    pub fn known_moods(&self) -> Vec<String> {
        self.mood.iter().flatten().cloned().collect()
    }

    /// Drops all generated metadata; used once the last record is gone.
    pub fn clear_metadata(&mut self) {
        self.description = None;
        self.genre.clear();
        self.mood.clear();
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

pub fn current_year() -> i32 {
    OffsetDateTime::now_utc().year()
}

#[cfg(test)]
mod tests {
    use super::{current_year, Collection, MIN_RECORD_YEAR};

    fn collection() -> Collection {
        Collection {
            id: "c1".to_string(),
            name: "Sunday".to_string(),
            description: Some("Slow records".to_string()),
            genre: vec![Some("Jazz".to_string()), None, None],
            mood: vec![Some("Calm".to_string()), Some("Warm".to_string()), None],
            records: vec!["r1".to_string()],
            owner: "u1".to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn known_tags_skip_empty_slots() {
        let collection = collection();
        assert_eq!(collection.known_genres(), vec!["Jazz".to_string()]);
        assert_eq!(
            collection.known_moods(),
            vec!["Calm".to_string(), "Warm".to_string()]
        );
    }

    #[test]
    fn clear_metadata_empties_tags() {
        let mut collection = collection();
        collection.clear_metadata();
        assert!(collection.description.is_none());
        assert!(collection.genre.is_empty());
        assert!(collection.mood.is_empty());
        assert!(collection.contains_record("r1"));
    }

    #[test]
    fn current_year_is_after_minimum() {
        assert!(current_year() > MIN_RECORD_YEAR);
    }
}
