use std::sync::Arc;

use common::{current_year, MIN_RECORD_YEAR};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatMessage, JsonModel};
use crate::EnrichmentError;

/// Longest genre or mood label kept from a model reply.
pub const MAX_TAG_CHARS: usize = 50;

const ALBUM_SYSTEM_PROMPT: &str = "You are a music expert who catalogues vinyl records. \
Always answer with a single JSON object and nothing else.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumMetadata {
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
}

impl AlbumMetadata {
    /// Metadata stored when generation fails.
    pub fn fallback(artist: &str) -> Self {
        Self {
            genre: None,
            mood: None,
            year: None,
            description: Some(format!("A record by {}", artist.trim())),
        }
    }

    /// Re-validates every field of a model reply; anything malformed is
    /// dropped to `None`.
    pub fn from_model_output(value: &Value, current_year: i32) -> Self {
        Self {
            genre: clean_tag(value.get("genre")),
            mood: clean_tag(value.get("mood")),
            year: clean_year(value.get("year"), current_year),
            description: clean_text(value.get("description")),
        }
    }
}

#[derive(Clone)]
pub struct AlbumMetadataGenerator {
    model: Arc<dyn JsonModel>,
}

impl AlbumMetadataGenerator {
    pub fn new(model: Arc<dyn JsonModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        name: &str,
        artist: &str,
    ) -> Result<AlbumMetadata, EnrichmentError> {
        let year = current_year();
        let reply = self.model.request(album_prompt(name, artist, year)).await?;
        Ok(AlbumMetadata::from_model_output(&reply, year))
    }
}

fn album_prompt(name: &str, artist: &str, current_year: i32) -> Vec<ChatMessage> {
    let user = format!(
        "Describe the album \"{name}\" by {artist}.\n\
Return a JSON object with exactly these fields:\n\
- \"genre\": the main genre as a short string (one to three words)\n\
- \"mood\": the overall mood as a short string (one to three words)\n\
- \"year\": the original release year as a number between {min} and {current_year}\n\
- \"description\": two or three sentences about the album\n\
If you cannot determine a field, set it to null. Do not guess a year.",
        name = name.trim(),
        artist = artist.trim(),
        min = MIN_RECORD_YEAR,
        current_year = current_year,
    );
    vec![ChatMessage::system(ALBUM_SYSTEM_PROMPT), ChatMessage::user(user)]
}

fn clean_tag(value: Option<&Value>) -> Option<String> {
    let text = clean_text(value)?;
    if text.chars().count() > MAX_TAG_CHARS {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn clean_text(value: Option<&Value>) -> Option<String> {
    let trimmed = value?.as_str()?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn clean_year(value: Option<&Value>, current_year: i32) -> Option<i32> {
    let year = match value? {
        Value::Number(number) => match number.as_i64() {
            Some(year) => year,
            None => {
                let year = number.as_f64()?;
                if year.fract() != 0.0 {
                    return None;
                }
                year as i64
            }
        },
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if (i64::from(MIN_RECORD_YEAR)..=i64::from(current_year)).contains(&year) {
        Some(year as i32)
    } else {
        None
    }
}
