//! Encoding and decoding of WebSocket text frames.
//!
//! Decoding happens in two steps so that the dispatcher can skip the typed
//! step for kinds nobody listens to:
//!
//! 1. [`decode_envelope`] parses the frame, reads `type` and resolves aliases.
//! 2. [`decode_event`] validates `content` against the schema of the kind.
//!
//! [`decode`] runs both.

use framewise_core::EventKind;
use serde::Deserialize;
use serde::de::{DeserializeOwned, Error as _};
use serde_json::{Map, Value};

use crate::error::{DecodeError, DecodeResult, ProtocolError, ProtocolResult};
use crate::inbound::{Envelope, InboundEvent, McqResponse, UiElementResponse, UiResponseData};
use crate::outbound::OutboundMessage;

/// Maximum frame size accepted or produced by default (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Parses a raw frame into an [`Envelope`], using [`MAX_FRAME_SIZE`].
pub fn decode_envelope(raw: &[u8]) -> DecodeResult<Envelope> {
    decode_envelope_with_limit(raw, MAX_FRAME_SIZE)
}

/// Parses a raw frame into an [`Envelope`] with an explicit size limit.
pub fn decode_envelope_with_limit(raw: &[u8], max: usize) -> DecodeResult<Envelope> {
    if raw.len() > max {
        return Err(DecodeError::FrameTooLarge {
            size: raw.len(),
            max,
        });
    }

    let value: Value =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(DecodeError::Malformed("expected a JSON object".into()));
    };

    let type_name = match fields.remove("type") {
        Some(Value::String(name)) => name,
        _ => return Err(DecodeError::MissingType),
    };
    let content = fields.remove("content").unwrap_or(Value::Null);

    Ok(Envelope {
        kind: EventKind::from_name(&type_name),
        type_name,
        content,
        extra: fields,
    })
}

/// Validates the content of an envelope against the schema of its kind.
pub fn decode_event(envelope: &Envelope) -> DecodeResult<InboundEvent> {
    let kind = &envelope.kind;
    match kind {
        EventKind::Join => typed(kind, &envelope.content).map(InboundEvent::Join),
        EventKind::Exit => typed(kind, &envelope.content).map(InboundEvent::Exit),
        EventKind::Transcript => typed(kind, &transcript_content(envelope))
            .map(InboundEvent::Transcript),
        EventKind::Invoke => typed(kind, &envelope.content).map(InboundEvent::Invoke),
        EventKind::ConnectionRejected => {
            typed(kind, &envelope.content).map(InboundEvent::ConnectionRejected)
        }
        EventKind::CustomUiResponse => {
            ui_response(kind, &envelope.content, None).map(InboundEvent::CustomUiResponse)
        }
        _ => ui_response(kind, &envelope.content, Some(kind.as_str()))
            .map(InboundEvent::UiElement),
    }
}

/// Parses and validates a raw frame in one go.
pub fn decode(raw: &[u8]) -> DecodeResult<InboundEvent> {
    decode_event(&decode_envelope(raw)?)
}

/// Rebuilds a UI element response with untyped data.
///
/// Used when typed validation of a UI subtype failed: the element type and
/// the data object are kept as received. Returns `None` when the content is
/// not a UI-shaped object at all.
pub fn ui_response_raw(envelope: &Envelope) -> Option<UiElementResponse> {
    let Value::Object(content) = &envelope.content else {
        return None;
    };
    let element_type = match content.get("type") {
        Some(Value::String(name)) => name.clone(),
        _ if envelope.kind.is_ui_element() => envelope.kind.as_str().to_string(),
        _ => return None,
    };
    let data = match content.get("data") {
        Some(Value::Object(data)) => data.clone(),
        None => Map::new(),
        Some(_) => return None,
    };
    Some(UiElementResponse {
        element_type,
        data: UiResponseData::Raw(data),
    })
}

/// Encodes an outbound message as a JSON text frame, using [`MAX_FRAME_SIZE`].
pub fn encode(message: &OutboundMessage) -> ProtocolResult<String> {
    encode_with_limit(message, MAX_FRAME_SIZE)
}

/// Encodes an outbound message with an explicit size limit.
pub fn encode_with_limit(message: &OutboundMessage, max: usize) -> ProtocolResult<String> {
    let text = serde_json::to_string(message)?;
    if text.len() > max {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            max,
        });
    }
    Ok(text)
}

fn typed<T: DeserializeOwned>(kind: &EventKind, content: &Value) -> DecodeResult<T> {
    T::deserialize(content).map_err(|source| schema_mismatch(kind, content, source))
}

fn schema_mismatch(kind: &EventKind, content: &Value, source: serde_json::Error) -> DecodeError {
    DecodeError::SchemaMismatch {
        kind: kind.clone(),
        content: content.clone(),
        source,
    }
}

/// Applies the legacy top-level `transcript`/`is_final` fields on top of the
/// content object.
fn transcript_content(envelope: &Envelope) -> Value {
    let legacy_text = envelope.extra.get("transcript").filter(|v| v.is_string());
    let legacy_final = envelope.extra.get("is_final").filter(|v| v.is_boolean());
    if legacy_text.is_none() && legacy_final.is_none() {
        return envelope.content.clone();
    }

    let mut content = match &envelope.content {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => return other.clone(),
    };
    if let Some(text) = legacy_text {
        content.insert("text".into(), text.clone());
    }
    if let Some(is_final) = legacy_final {
        content.insert("is_final".into(), is_final.clone());
    }
    Value::Object(content)
}

#[derive(Deserialize)]
struct UiResponseShape {
    #[serde(rename = "type", default)]
    element_type: Option<String>,
    #[serde(default)]
    data: Map<String, Value>,
}

fn ui_response(
    kind: &EventKind,
    content: &Value,
    default_type: Option<&str>,
) -> DecodeResult<UiElementResponse> {
    let shape: UiResponseShape = typed(kind, content)?;
    let element_type = match (shape.element_type, default_type) {
        (Some(name), _) => name,
        (None, Some(name)) => name.to_string(),
        (None, None) => {
            return Err(schema_mismatch(
                kind,
                content,
                serde_json::Error::missing_field("type"),
            ));
        }
    };

    let data = if EventKind::from_name(&element_type) == EventKind::McqQuestion {
        let mcq = McqResponse::deserialize(Value::Object(shape.data))
            .map_err(|source| schema_mismatch(kind, content, source))?;
        UiResponseData::McqQuestion(mcq)
    } else {
        UiResponseData::Raw(shape.data)
    };

    Ok(UiElementResponse { element_type, data })
}
