//! Outbound message types sent to the meeting service.
//!
//! Every reply-style message carries a fresh `message_id`, the meeting it
//! belongs to and a timestamp. Those are filled in by the constructors, so a
//! message without them cannot be built.

use chrono::{DateTime, Utc};
use framewise_core::wire_timestamp;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default display duration of a notification, in milliseconds.
pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 8000;

/// A complete outbound message.
///
/// Serializes as
/// `{"message_id", "meeting_id", "timestamp", "type", "content"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    message_id: String,
    meeting_id: String,
    timestamp: String,
    #[serde(flatten)]
    body: OutboundBody,
}

impl OutboundMessage {
    /// Creates a message for the given meeting, stamped with the current time.
    pub fn new(meeting_id: impl Into<String>, body: OutboundBody) -> Self {
        Self::at(meeting_id, body, Utc::now())
    }

    /// Creates a message stamped with the given time.
    pub fn at(meeting_id: impl Into<String>, body: OutboundBody, at: DateTime<Utc>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            meeting_id: meeting_id.into(),
            timestamp: wire_timestamp(at),
            body,
        }
    }

    /// Returns the message ID.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Returns the meeting ID.
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// Returns the timestamp.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Returns the message body.
    pub fn body(&self) -> &OutboundBody {
        &self.body
    }
}

/// The typed part of an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum OutboundBody {
    /// Text produced by the agent.
    GeneratedText(GeneratedText),
    /// A UI element to render for participants.
    CustomUiElement(UiElement),
    /// An error report.
    Error(ErrorContent),
}

impl OutboundBody {
    /// Creates a generated text body.
    pub fn generated_text(text: impl Into<String>, is_generation_end: bool) -> Self {
        Self::GeneratedText(GeneratedText {
            text: text.into(),
            is_generation_end,
        })
    }

    /// Creates a multiple-choice question element.
    pub fn mcq_question(
        id: impl Into<String>,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self::CustomUiElement(UiElement::McqQuestion(McqQuestionData::new(
            id, question, options,
        )))
    }

    /// Creates a notification element.
    pub fn notification(
        message: impl Into<String>,
        level: NotificationLevel,
        duration_ms: u64,
    ) -> Self {
        Self::CustomUiElement(UiElement::Notification(NotificationData {
            message: message.into(),
            level,
            duration: duration_ms,
        }))
    }

    /// Creates a custom element of an arbitrary type.
    pub fn custom_ui_element(element_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::CustomUiElement(UiElement::Custom {
            element_type: element_type.into(),
            data,
        })
    }

    /// Creates an error body.
    pub fn error(error: impl Into<String>, error_code: Option<String>) -> Self {
        Self::Error(ErrorContent {
            error: error.into(),
            error_code,
        })
    }

    /// Returns the wire `type` of this body.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GeneratedText(_) => "generated_text",
            Self::CustomUiElement(_) => "custom_ui_element",
            Self::Error(_) => "error",
        }
    }
}

/// Content of a generated text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    /// Generated text.
    pub text: String,
    /// Whether this is the last chunk of the generation.
    pub is_generation_end: bool,
}

/// Content of an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContent {
    /// Error message.
    pub error: String,
    /// Error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Data of a multiple-choice question element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqQuestionData {
    /// Question identifier.
    pub id: String,
    /// Question text.
    pub question: String,
    /// Option texts.
    pub options: Vec<String>,
    /// Optional image shown with the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl McqQuestionData {
    /// Creates question data without an image.
    pub fn new(id: impl Into<String>, question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            options,
            image_path: None,
        }
    }

    /// Builder: set image path.
    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Informational (default).
    #[default]
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// Success.
    Success,
}

/// Data of a notification element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Notification text.
    pub message: String,
    /// Notification level.
    pub level: NotificationLevel,
    /// Display duration in milliseconds.
    pub duration: u64,
}

/// A UI element, serialized as `{"type": <element-kind>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum UiElement {
    /// `mcq_question`
    McqQuestion(McqQuestionData),
    /// `notification_element`
    Notification(NotificationData),
    /// Any other element type with free-form data.
    Custom {
        /// Element type name.
        element_type: String,
        /// Element data.
        data: Map<String, Value>,
    },
}

impl UiElement {
    /// Returns the wire type of this element.
    pub fn element_type(&self) -> &str {
        match self {
            Self::McqQuestion(_) => "mcq_question",
            Self::Notification(_) => "notification_element",
            Self::Custom { element_type, .. } => element_type,
        }
    }
}

impl Serialize for UiElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UiElement", 2)?;
        state.serialize_field("type", self.element_type())?;
        match self {
            Self::McqQuestion(data) => state.serialize_field("data", data)?,
            Self::Notification(data) => state.serialize_field("data", data)?,
            Self::Custom { data, .. } => state.serialize_field("data", data)?,
        }
        state.end()
    }
}
