//! Event kinds and alias resolution.
//!
//! Every inbound message carries a `type` string. A small static table maps
//! the human-facing names (`"join"`, `"exit"`, ...) to the canonical names used
//! on the wire (`"on_join"`, `"on_exit"`, ...). Names that are not in the
//! table pass through unchanged, which is how UI element subtypes such as
//! `"mcq_question"` become first-class kinds of their own.
//!
//! ```rust
//! use framewise_core::{resolve_alias, EventKind};
//!
//! assert_eq!(resolve_alias("join"), "on_join");
//! assert_eq!(resolve_alias("star_rating"), "star_rating");
//! assert_eq!(EventKind::from_name("exit"), EventKind::Exit);
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Canonical wire name of the join event.
pub const JOIN_EVENT: &str = "on_join";
/// Canonical wire name of the exit event.
pub const EXIT_EVENT: &str = "on_exit";
/// Canonical wire name of the transcript event.
pub const TRANSCRIPT_EVENT: &str = "transcript";
/// Canonical wire name of the invoke event.
pub const INVOKE_EVENT: &str = "invoke";
/// Canonical wire name of the custom UI element response event.
pub const CUSTOM_UI_RESPONSE_EVENT: &str = "custom_ui_element_response";
/// Canonical wire name of the connection rejected event.
pub const CONNECTION_REJECTED_EVENT: &str = "connection_rejected";

/// Alias table: human-facing name to canonical wire name.
const ALIASES: &[(&str, &str)] = &[
    ("join", JOIN_EVENT),
    ("exit", EXIT_EVENT),
    ("transcript", TRANSCRIPT_EVENT),
    ("invoke", INVOKE_EVENT),
    ("connection_rejected", CONNECTION_REJECTED_EVENT),
    ("custom_ui_response", CUSTOM_UI_RESPONSE_EVENT),
    ("custom_ui", CUSTOM_UI_RESPONSE_EVENT),
];

/// Resolves a human-facing event name to its canonical wire name.
///
/// Unknown names are returned unchanged. Resolution is idempotent: resolving
/// a canonical name yields the same name.
pub fn resolve_alias(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |&(_, canonical)| canonical)
}

/// A canonical class of inbound message.
///
/// The set is closed except for [`EventKind::Other`], which carries UI element
/// subtypes the server defines but this crate has no name for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A participant joined the meeting.
    Join,
    /// A participant left the meeting.
    Exit,
    /// A (partial or final) speech transcript.
    Transcript,
    /// Fired for final transcripts that should produce a reply.
    Invoke,
    /// A participant interacted with a custom UI element.
    CustomUiResponse,
    /// The service refused this client's connection.
    ConnectionRejected,
    /// Multiple-choice question element.
    McqQuestion,
    /// Places autocomplete element.
    PlacesAutocomplete,
    /// File upload element.
    UploadFile,
    /// Free text input element.
    TextInput,
    /// Consent form element.
    ConsentForm,
    /// Scheduling link element.
    Calendly,
    /// Any other UI element subtype, keyed by its wire name.
    Other(String),
}

impl EventKind {
    /// Builds a kind from a wire or alias name.
    pub fn from_name(name: &str) -> Self {
        match resolve_alias(name) {
            JOIN_EVENT => Self::Join,
            EXIT_EVENT => Self::Exit,
            TRANSCRIPT_EVENT => Self::Transcript,
            INVOKE_EVENT => Self::Invoke,
            CUSTOM_UI_RESPONSE_EVENT => Self::CustomUiResponse,
            CONNECTION_REJECTED_EVENT => Self::ConnectionRejected,
            "mcq_question" => Self::McqQuestion,
            "places_autocomplete" => Self::PlacesAutocomplete,
            "upload_file" => Self::UploadFile,
            "textinput" => Self::TextInput,
            "consent_form" => Self::ConsentForm,
            "calendly" => Self::Calendly,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => JOIN_EVENT,
            Self::Exit => EXIT_EVENT,
            Self::Transcript => TRANSCRIPT_EVENT,
            Self::Invoke => INVOKE_EVENT,
            Self::CustomUiResponse => CUSTOM_UI_RESPONSE_EVENT,
            Self::ConnectionRejected => CONNECTION_REJECTED_EVENT,
            Self::McqQuestion => "mcq_question",
            Self::PlacesAutocomplete => "places_autocomplete",
            Self::UploadFile => "upload_file",
            Self::TextInput => "textinput",
            Self::ConsentForm => "consent_form",
            Self::Calendly => "calendly",
            Self::Other(name) => name,
        }
    }

    /// Returns true for UI element subtypes (including unknown ones).
    pub fn is_ui_element(&self) -> bool {
        matches!(
            self,
            Self::McqQuestion
                | Self::PlacesAutocomplete
                | Self::UploadFile
                | Self::TextInput
                | Self::ConsentForm
                | Self::Calendly
                | Self::Other(_)
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_canonical_names() {
        assert_eq!(resolve_alias("join"), "on_join");
        assert_eq!(resolve_alias("exit"), "on_exit");
        assert_eq!(resolve_alias("transcript"), "transcript");
        assert_eq!(resolve_alias("invoke"), "invoke");
        assert_eq!(resolve_alias("connection_rejected"), "connection_rejected");
        assert_eq!(
            resolve_alias("custom_ui_response"),
            "custom_ui_element_response"
        );
        assert_eq!(resolve_alias("custom_ui"), "custom_ui_element_response");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(resolve_alias("mcq_question"), "mcq_question");
        assert_eq!(resolve_alias("star_rating"), "star_rating");
        assert_eq!(resolve_alias(""), "");
    }

    #[test]
    fn resolution_is_idempotent() {
        for name in ["join", "exit", "custom_ui", "upload_file", "anything"] {
            let once = resolve_alias(name);
            assert_eq!(resolve_alias(once), once);
        }
    }

    #[test]
    fn kind_from_alias_and_canonical_name() {
        assert_eq!(EventKind::from_name("join"), EventKind::Join);
        assert_eq!(EventKind::from_name("on_join"), EventKind::Join);
        assert_eq!(
            EventKind::from_name("custom_ui"),
            EventKind::CustomUiResponse
        );
        assert_eq!(EventKind::from_name("textinput"), EventKind::TextInput);
    }

    #[test]
    fn unknown_kind_keeps_its_name() {
        let kind = EventKind::from_name("star_rating");
        assert_eq!(kind, EventKind::Other("star_rating".to_string()));
        assert_eq!(kind.as_str(), "star_rating");
        assert!(kind.is_ui_element());
    }

    #[test]
    fn ui_element_classification() {
        assert!(EventKind::McqQuestion.is_ui_element());
        assert!(EventKind::Calendly.is_ui_element());
        assert!(!EventKind::Transcript.is_ui_element());
        assert!(!EventKind::CustomUiResponse.is_ui_element());
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(EventKind::Exit.to_string(), "on_exit");
        assert_eq!("upload_file".parse::<EventKind>().unwrap(), EventKind::UploadFile);
    }
}
