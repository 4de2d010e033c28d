//! Defensive parsing of dialogue backend output
//!
//! Models asked for `{"emotion": ..., "responseText": ...}` often wrap it in
//! markdown fences or a sentence of prose. Parsing tries, in order: the whole
//! payload, the payload with fences stripped, and the outermost `{...}` span.
//! If none yields a usable reply the raw text is spoken with neutral delivery.

use crate::types::{DialogueReply, EmotionTag};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").unwrap());

const TEXT_KEYS: [&str; 4] = ["responseText", "response_text", "response", "text"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    /// Payload matched the expected schema
    Structured(DialogueReply),
    /// Payload was unusable; carries the neutral textual fallback
    Fallback(DialogueReply),
}

impl ParsedReply {
    pub fn into_reply(self) -> DialogueReply {
        match self {
            ParsedReply::Structured(reply) | ParsedReply::Fallback(reply) => reply,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedReply::Fallback(_))
    }
}

pub fn parse_reply(raw: &str) -> ParsedReply {
    let trimmed = raw.trim();

    let mut candidates = vec![trimmed.to_string()];
    if let Some(captures) = FENCE.captures(trimmed) {
        candidates.push(captures[1].to_string());
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(trimmed[start..=end].to_string());
        }
    }

    for candidate in &candidates {
        if let Some(reply) = reply_from_json(candidate) {
            return ParsedReply::Structured(reply);
        }
    }

    tracing::warn!("Dialogue payload did not match the reply schema, speaking it as-is");
    ParsedReply::Fallback(DialogueReply::neutral(strip_fences(trimmed)))
}

fn reply_from_json(candidate: &str) -> Option<DialogueReply> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;

    let response_text = TEXT_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())?
        .to_string();

    let emotion = object
        .get("emotion")
        .and_then(Value::as_str)
        .map(EmotionTag::parse)
        .unwrap_or_default();

    Some(DialogueReply {
        emotion,
        response_text,
    })
}

fn strip_fences(text: &str) -> String {
    match FENCE.captures(text) {
        Some(captures) => captures[1].trim().to_string(),
        None => text.to_string(),
    }
}
