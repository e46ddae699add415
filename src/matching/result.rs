//! Ranked match output.

use serde::Serialize;

use crate::storage::JobRecord;
use crate::vector::{Neighbor, RecordId};

/// Appended to a preview that was cut short.
pub const ELLIPSIS: &str = "...";

/// One ranked job posting for a query.
///
/// `similarity` is a linear rescaling of the index distance, ordinal within
/// one index only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub record_id: RecordId,
    pub title: String,
    pub company: String,
    pub similarity: f32,
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl MatchResult {
    pub(crate) fn assemble(record: JobRecord, neighbor: &Neighbor, preview_chars: usize) -> Self {
        let excerpt = if record.description.trim().is_empty() {
            None
        } else {
            Some(preview(&record.description, preview_chars))
        };

        Self {
            record_id: record.id,
            title: record.title,
            company: record.company,
            similarity: neighbor.similarity().get(),
            distance: neighbor.distance,
            excerpt,
        }
    }
}

/// First `max_chars` characters of `text`, with [`ELLIPSIS`] appended when
/// anything was cut.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}
