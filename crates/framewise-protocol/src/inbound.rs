//! Inbound message types received from the meeting service.

use framewise_core::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded but not yet typed inbound frame.
///
/// The `type` field has been read and resolved; `content` is still the raw
/// JSON value. Top-level fields other than `type` and `content` are kept in
/// `extra` for legacy formats that put data next to the content.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Resolved event kind.
    pub kind: EventKind,
    /// The `type` string exactly as received.
    pub type_name: String,
    /// Raw content (`Value::Null` if absent).
    pub content: Value,
    /// Remaining top-level fields.
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope for the given kind and content.
    pub fn new(kind: EventKind, content: Value) -> Self {
        Self {
            type_name: kind.as_str().to_string(),
            kind,
            content,
            extra: Map::new(),
        }
    }
}

/// Content of a transcript (and invoke) message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptContent {
    /// The transcript text.
    pub text: String,
    /// Whether this is a final transcript.
    #[serde(default)]
    pub is_final: bool,
    /// Confidence score for the transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Language code for the transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    /// Alternative transcriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<Map<String, Value>>>,
    /// ID of the speaker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
}

/// Content of join and exit messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEvent {
    /// ID of the meeting.
    pub meeting_id: String,
    /// ID of the participant.
    pub participant_id: String,
    /// Display name of the participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    /// Role of the participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_role: Option<String>,
}

/// Content of a connection rejected message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRejected {
    /// Reason for the rejection.
    pub reason: String,
    /// Error code, if the service sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Meeting the rejection applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
}

/// A participant's answer to a multiple-choice question element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqResponse {
    /// Question identifier.
    pub id: String,
    /// Question text, echoed back by the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Option texts, echoed back by the UI.
    #[serde(default)]
    pub options: Vec<String>,
    /// Text of the selected option.
    #[serde(
        default,
        rename = "selectedOption",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_option: Option<String>,
    /// Index of the selected option.
    #[serde(
        default,
        rename = "selectedIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_index: Option<usize>,
    /// Image shown with the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Data payload of a UI element response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UiResponseData {
    /// Typed multiple-choice answer.
    McqQuestion(McqResponse),
    /// Subtypes whose shape is server-defined, or data that did not match
    /// its typed schema.
    Raw(Map<String, Value>),
}

/// A participant's interaction with a UI element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiElementResponse {
    /// Element subtype (e.g. `mcq_question`).
    #[serde(rename = "type")]
    pub element_type: String,
    /// Element data.
    pub data: UiResponseData,
}

impl UiElementResponse {
    /// Returns the event kind of the element subtype.
    pub fn element_kind(&self) -> EventKind {
        EventKind::from_name(&self.element_type)
    }

    /// Returns the typed MCQ answer, if this is one.
    pub fn as_mcq(&self) -> Option<&McqResponse> {
        match &self.data {
            UiResponseData::McqQuestion(mcq) => Some(mcq),
            UiResponseData::Raw(_) => None,
        }
    }

    /// Returns the raw data, if this response was not typed.
    pub fn raw_data(&self) -> Option<&Map<String, Value>> {
        match &self.data {
            UiResponseData::Raw(map) => Some(map),
            UiResponseData::McqQuestion(_) => None,
        }
    }
}

/// A typed inbound event, one variant per content schema.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A participant joined.
    Join(ParticipantEvent),
    /// A participant left.
    Exit(ParticipantEvent),
    /// A transcript fragment.
    Transcript(TranscriptContent),
    /// A final transcript that should be answered.
    Invoke(TranscriptContent),
    /// A response to a custom UI element, delivered under the generic kind.
    CustomUiResponse(UiElementResponse),
    /// A UI element response delivered under its own subtype kind.
    UiElement(UiElementResponse),
    /// The service rejected this connection.
    ConnectionRejected(ConnectionRejected),
}

impl InboundEvent {
    /// Returns the kind this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join(_) => EventKind::Join,
            Self::Exit(_) => EventKind::Exit,
            Self::Transcript(_) => EventKind::Transcript,
            Self::Invoke(_) => EventKind::Invoke,
            Self::CustomUiResponse(_) => EventKind::CustomUiResponse,
            Self::UiElement(response) => response.element_kind(),
            Self::ConnectionRejected(_) => EventKind::ConnectionRejected,
        }
    }

    /// Returns the UI element response carried by this event, if any.
    pub fn ui_response(&self) -> Option<&UiElementResponse> {
        match self {
            Self::CustomUiResponse(response) | Self::UiElement(response) => Some(response),
            _ => None,
        }
    }
}
