//! Slot aggregation for multipart submissions
//!
//! Field names are decoded once, at the boundary, into [`SlotField`]. The
//! aggregation below only ever sees slot numbers and field kinds.

use axum::body::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Which part of a slot a field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFieldKind {
    Audio,
    Photo,
    Metadata,
    Description,
}

/// Decoded `recording_<n>_<kind>` field name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotField {
    pub slot: u32,
    pub kind: SlotFieldKind,
}

impl SlotField {
    /// Decode a field name; `None` for anything outside the schema
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("recording_")?;
        let (number, kind) = rest.split_once('_')?;

        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let slot = number.parse().ok()?;

        let kind = match kind {
            "audio" => SlotFieldKind::Audio,
            "photo" => SlotFieldKind::Photo,
            "metadata" => SlotFieldKind::Metadata,
            "description" => SlotFieldKind::Description,
            _ => return None,
        };

        Some(Self { slot, kind })
    }
}

/// Payload of one multipart part
#[derive(Debug, Clone)]
pub enum PartPayload {
    /// Uploaded file content
    File(Bytes),
    /// Plain form value
    Text(String),
}

impl PartPayload {
    fn into_bytes(self) -> Bytes {
        match self {
            PartPayload::File(bytes) => bytes,
            PartPayload::Text(text) => Bytes::from(text),
        }
    }

    fn into_text(self) -> Result<String, String> {
        match self {
            PartPayload::Text(text) => Ok(text),
            PartPayload::File(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|e| format!("not valid UTF-8: {}", e)),
        }
    }
}

/// One named part of a submission
#[derive(Debug, Clone)]
pub struct SubmissionPart {
    pub name: String,
    pub payload: PartPayload,
}

impl SubmissionPart {
    pub fn file(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: PartPayload::File(bytes.into()),
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: PartPayload::Text(value.into()),
        }
    }
}

/// Partially-filled slot while parts are still arriving
#[derive(Debug, Default)]
struct SlotDraft {
    audio: Option<Bytes>,
    photo: Option<Bytes>,
    metadata: Option<Result<Map<String, Value>, String>>,
    description: Option<String>,
}

/// A slot that carries metadata and is therefore persisted
#[derive(Debug, Clone)]
pub struct CompleteSlot {
    pub slot: u32,
    pub metadata: Map<String, Value>,
    pub description: String,
    pub audio: Option<Bytes>,
    pub photo: Option<Bytes>,
}

/// Why a slot was left out of the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum SkipReason {
    /// Metadata text did not decode to a JSON object
    MalformedMetadata(String),
    /// Audio/photo/description arrived without any metadata
    MissingMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSlot {
    pub slot: u32,
    pub reason: SkipReason,
}

/// Result of aggregating one submission
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Complete slots in ascending slot order
    pub slots: Vec<CompleteSlot>,
    pub skipped: Vec<SkippedSlot>,
    /// Field names outside the `recording_<n>_<kind>` schema
    pub ignored_fields: usize,
}

/// Group submission parts by slot number
///
/// Parts may arrive in any order. If the same field appears twice for a
/// slot the later one wins.
pub fn aggregate(parts: impl IntoIterator<Item = SubmissionPart>) -> Aggregation {
    let mut drafts: BTreeMap<u32, SlotDraft> = BTreeMap::new();
    let mut ignored_fields = 0;

    for part in parts {
        let Some(field) = SlotField::parse(&part.name) else {
            debug!(field = %part.name, "Ignoring field outside recording schema");
            ignored_fields += 1;
            continue;
        };

        let draft = drafts.entry(field.slot).or_default();
        match field.kind {
            SlotFieldKind::Audio => draft.audio = Some(part.payload.into_bytes()),
            SlotFieldKind::Photo => draft.photo = Some(part.payload.into_bytes()),
            SlotFieldKind::Description => {
                draft.description = Some(part.payload.into_text().unwrap_or_else(|reason| {
                    warn!(slot = field.slot, %reason, "Discarding unreadable description");
                    String::new()
                }))
            }
            SlotFieldKind::Metadata => {
                let parsed = part.payload.into_text().and_then(|text| parse_metadata(&text));
                if let Err(reason) = &parsed {
                    warn!(slot = field.slot, %reason, "Malformed metadata, slot will be skipped");
                }
                draft.metadata = Some(parsed);
            }
        }
    }

    let mut aggregation = Aggregation {
        ignored_fields,
        ..Default::default()
    };

    for (slot, draft) in drafts {
        match draft.metadata {
            Some(Ok(metadata)) => aggregation.slots.push(CompleteSlot {
                slot,
                metadata,
                description: draft.description.unwrap_or_default(),
                audio: draft.audio,
                photo: draft.photo,
            }),
            Some(Err(reason)) => aggregation.skipped.push(SkippedSlot {
                slot,
                reason: SkipReason::MalformedMetadata(reason),
            }),
            None => {
                debug!(slot, "Slot has no metadata, discarding");
                aggregation.skipped.push(SkippedSlot {
                    slot,
                    reason: SkipReason::MissingMetadata,
                });
            }
        }
    }

    aggregation
}

fn parse_metadata(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("metadata must be a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_decoding() {
        assert_eq!(
            SlotField::parse("recording_3_audio"),
            Some(SlotField { slot: 3, kind: SlotFieldKind::Audio })
        );
        assert_eq!(
            SlotField::parse("recording_12_description"),
            Some(SlotField { slot: 12, kind: SlotFieldKind::Description })
        );
        assert_eq!(SlotField::parse("recording__audio"), None);
        assert_eq!(SlotField::parse("recording_-1_audio"), None);
        assert_eq!(SlotField::parse("recording_1_video"), None);
        assert_eq!(SlotField::parse("recording_1_audio_extra"), None);
        assert_eq!(SlotField::parse("timestamp"), None);
    }

    #[test]
    fn test_slots_without_metadata_are_skipped() {
        let aggregation = aggregate(vec![
            SubmissionPart::file("recording_0_audio", vec![1u8, 2, 3]),
            SubmissionPart::file("recording_0_photo", vec![9u8]),
            SubmissionPart::file("recording_1_audio", vec![4u8]),
            SubmissionPart::text("recording_1_metadata", r#"{"note":"kept"}"#),
        ]);

        assert_eq!(aggregation.slots.len(), 1);
        assert_eq!(aggregation.slots[0].slot, 1);
        assert_eq!(
            aggregation.skipped,
            vec![SkippedSlot { slot: 0, reason: SkipReason::MissingMetadata }]
        );
    }

    #[test]
    fn test_malformed_metadata_only_drops_its_slot() {
        let aggregation = aggregate(vec![
            SubmissionPart::text("recording_0_metadata", "{not json"),
            SubmissionPart::text("recording_1_metadata", "[1, 2]"),
            SubmissionPart::text("recording_2_metadata", r#"{"ok":true}"#),
            SubmissionPart::text("recording_2_description", "fine"),
        ]);

        assert_eq!(aggregation.slots.len(), 1);
        assert_eq!(aggregation.slots[0].slot, 2);
        assert_eq!(aggregation.slots[0].description, "fine");
        assert_eq!(aggregation.skipped.len(), 2);
        assert!(aggregation
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::MalformedMetadata(_))));
    }

    #[test]
    fn test_order_of_parts_does_not_matter() {
        let forward = vec![
            SubmissionPart::text("recording_5_metadata", r#"{"a":1}"#),
            SubmissionPart::text("recording_5_description", "d"),
            SubmissionPart::file("recording_5_audio", vec![7u8; 4]),
            SubmissionPart::text("unrelated", "x"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = aggregate(forward);
        let b = aggregate(reversed);

        assert_eq!(a.slots.len(), 1);
        assert_eq!(b.slots.len(), 1);
        assert_eq!(a.slots[0].metadata, b.slots[0].metadata);
        assert_eq!(a.slots[0].description, b.slots[0].description);
        assert_eq!(a.slots[0].audio, b.slots[0].audio);
        assert_eq!(a.ignored_fields, 1);
    }

    #[test]
    fn test_missing_description_defaults_to_empty() {
        let aggregation = aggregate(vec![SubmissionPart::text(
            "recording_0_metadata",
            "{}",
        )]);
        assert_eq!(aggregation.slots[0].description, "");
        assert!(aggregation.slots[0].audio.is_none());
    }
}
