//! Wire protocol for the framewise meeting service.
//!
//! Frames are UTF-8 JSON text messages carried over a WebSocket.
//!
//! # Inbound
//!
//! Every inbound frame is an envelope `{"type": <string>, "content": {...}}`.
//! The `type` is resolved through the alias table in `framewise-core` and
//! selects the schema `content` must satisfy. Decoding yields an
//! [`InboundEvent`], or a [`DecodeError`] when the frame is malformed, has no
//! type, or does not match its schema.
//!
//! # Outbound
//!
//! Reply-style messages are built with [`OutboundMessage::new`], which fills
//! in a fresh message ID and the current timestamp:
//!
//! ```rust
//! use framewise_protocol::{OutboundBody, OutboundMessage, decode, encode};
//!
//! let body = OutboundBody::mcq_question("q1", "Pick one", vec!["A".into(), "B".into()]);
//! let text = encode(&OutboundMessage::new("meeting-1", body)).unwrap();
//!
//! let event = decode(text.as_bytes()).unwrap();
//! assert_eq!(event.ui_response().unwrap().as_mcq().unwrap().id, "q1");
//! ```

mod codec;
mod error;
mod inbound;
mod outbound;

pub use codec::{
    MAX_FRAME_SIZE, decode, decode_envelope, decode_envelope_with_limit, decode_event, encode,
    encode_with_limit, ui_response_raw,
};
pub use error::{DecodeError, DecodeResult, ProtocolError, ProtocolResult};
pub use inbound::{
    ConnectionRejected, Envelope, InboundEvent, McqResponse, ParticipantEvent, TranscriptContent,
    UiElementResponse, UiResponseData,
};
pub use outbound::{
    DEFAULT_NOTIFICATION_DURATION_MS, ErrorContent, GeneratedText, McqQuestionData,
    NotificationData, NotificationLevel, OutboundBody, OutboundMessage, UiElement,
};
