use std::sync::Arc;

use common::Record;
use serde::Serialize;
use serde_json::Value;

use crate::album::clean_text;
use crate::llm::{ChatMessage, JsonModel};
use crate::EnrichmentError;

/// Number of genre and mood slots kept for a collection.
pub const TOP_TAGS: usize = 3;

const COLLECTION_SYSTEM_PROMPT: &str = "You are a music curator describing vinyl record \
collections. Always answer with a single JSON object and nothing else.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectionMetadata {
    pub description: Option<String>,
    pub genres: [Option<String>; TOP_TAGS],
    pub moods: [Option<String>; TOP_TAGS],
}

impl CollectionMetadata {
    pub fn from_model_output(value: &Value) -> Self {
        Self {
            description: clean_text(value.get("description")),
            genres: top_tags(value.get("genres").or_else(|| value.get("genre"))),
            moods: top_tags(value.get("moods").or_else(|| value.get("mood"))),
        }
    }
}

/// Normalizes a model-provided tag list to exactly [`TOP_TAGS`] slots.
///
/// Blank, non-string and case-insensitively repeated entries are skipped;
/// the list is cut after three values and padded with `None`.
pub fn top_tags(value: Option<&Value>) -> [Option<String>; TOP_TAGS] {
    let mut out: [Option<String>; TOP_TAGS] = Default::default();
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::String(_)) => vec![single],
        _ => return out,
    };
    let mut filled = 0;
    for item in items {
        if filled == TOP_TAGS {
            break;
        }
        let Some(tag) = clean_text(Some(item)) else {
            continue;
        };
        let seen = out[..filled]
            .iter()
            .flatten()
            .any(|existing| existing.eq_ignore_ascii_case(&tag));
        if !seen {
            out[filled] = Some(tag);
            filled += 1;
        }
    }
    out
}

/// One prompt line per record: `{name} by {artist} ({genre}, {mood})`.
pub fn describe_record(record: &Record) -> String {
    format!(
        "{} by {} ({}, {})",
        record.name,
        record.artist,
        record.genre.as_deref().unwrap_or("unknown genre"),
        record.mood.as_deref().unwrap_or("unknown mood"),
    )
}

#[derive(Clone)]
pub struct CollectionMetadataAggregator {
    model: Arc<dyn JsonModel>,
}

impl CollectionMetadataAggregator {
    pub fn new(model: Arc<dyn JsonModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        records: &[Record],
        existing_genres: &[String],
        existing_moods: &[String],
    ) -> Result<CollectionMetadata, EnrichmentError> {
        if records.is_empty() {
            return Err(EnrichmentError::EmptyCollection);
        }
        let messages = collection_prompt(records, existing_genres, existing_moods);
        let reply = self.model.request(messages).await?;
        Ok(CollectionMetadata::from_model_output(&reply))
    }
}

fn collection_prompt(
    records: &[Record],
    existing_genres: &[String],
    existing_moods: &[String],
) -> Vec<ChatMessage> {
    let listing = records
        .iter()
        .map(|record| format!("- {}", describe_record(record)))
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!(
        "A collection contains these records:\n{listing}\n\n\
Genres previously assigned to the collection: {genres}\n\
Moods previously assigned to the collection: {moods}\n\n\
Considering both the previous tags and the records above, return a JSON object with:\n\
- \"genres\": an array of the top {top} genres of the collection\n\
- \"moods\": an array of the top {top} moods of the collection\n\
- \"description\": three to four sentences describing the overall theme of the collection\n\
Only use genres and moods that fit the records. \
Use fewer entries if there are not enough distinct values.",
        listing = listing,
        genres = tag_list(existing_genres),
        moods = tag_list(existing_moods),
        top = TOP_TAGS,
    );
    vec![
        ChatMessage::system(COLLECTION_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

fn tag_list(tags: &[String]) -> String {
    if tags.is_empty() {
        "none".to_string()
    } else {
        tags.join(", ")
    }
}
