//! Outbound bridge.
//!
//! Only the session loop writes to the socket. Everything else (handlers,
//! other tasks, plain threads) hands messages to it through an
//! [`OutboundSender`]. Scheduling never blocks: the request goes onto an
//! unbounded queue and the caller gets a [`SendTicket`] that resolves once
//! the loop has written the frame or given up on it.
//!
//! Requests from one sender are written in the order they were scheduled.

use std::sync::Arc;

use framewise_protocol::{NotificationLevel, OutboundBody, OutboundMessage};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{trace, warn};

use crate::error::SendError;
use crate::session::SessionState;

/// One queued send and the channel its outcome goes back on.
pub(crate) struct OutboundRequest {
    pub(crate) message: OutboundMessage,
    pub(crate) reply: oneshot::Sender<Result<(), SendError>>,
}

impl OutboundRequest {
    /// Answers the request; the caller may have stopped listening.
    pub(crate) fn finish(self, result: Result<(), SendError>) {
        let _ = self.reply.send(result);
    }
}

/// Cloneable handle for scheduling outbound messages.
#[derive(Clone, Debug)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<OutboundRequest>,
    meeting_id: Arc<str>,
    state: watch::Receiver<SessionState>,
}

impl OutboundSender {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<OutboundRequest>,
        meeting_id: Arc<str>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            tx,
            meeting_id,
            state,
        }
    }

    /// Returns the meeting messages are addressed to.
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// Returns true if the session is connected right now.
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == SessionState::Running
    }

    /// Schedules a message with the given body for this meeting.
    pub fn schedule_send(&self, body: OutboundBody) -> SendTicket {
        self.schedule_message(OutboundMessage::new(&*self.meeting_id, body))
    }

    /// Schedules an already built message.
    ///
    /// Fails right away with [`SendError::NotConnected`] if the session is
    /// not connected, and with [`SendError::SessionClosed`] if it has ended.
    pub fn schedule_message(&self, message: OutboundMessage) -> SendTicket {
        let state = *self.state.borrow();
        match state {
            SessionState::Running => {}
            state if state.is_terminal() || state == SessionState::Stopping => {
                return Self::rejected(&message, SendError::SessionClosed);
            }
            _ => return Self::rejected(&message, SendError::NotConnected),
        }

        trace!(message_id = message.message_id(), kind = message.body().type_name(), "scheduling send");
        let (reply, rx) = oneshot::channel();
        match self.tx.send(OutboundRequest { message, reply }) {
            Ok(()) => SendTicket::pending(rx),
            Err(rejected) => Self::rejected(&rejected.0.message, SendError::SessionClosed),
        }
    }

    fn rejected(message: &OutboundMessage, error: SendError) -> SendTicket {
        warn!(
            error = %error,
            message_id = message.message_id(),
            kind = message.body().type_name(),
            "send rejected"
        );
        SendTicket::ready(Err(error))
    }

    /// Sends generated text.
    pub fn send_text(&self, text: impl Into<String>, is_generation_end: bool) -> SendTicket {
        self.schedule_send(OutboundBody::generated_text(text, is_generation_end))
    }

    /// Sends a multiple-choice question.
    pub fn send_mcq_question(
        &self,
        id: impl Into<String>,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> SendTicket {
        self.schedule_send(OutboundBody::mcq_question(id, question, options))
    }

    /// Sends a notification shown to every participant.
    pub fn send_notification(
        &self,
        message: impl Into<String>,
        level: NotificationLevel,
        duration_ms: u64,
    ) -> SendTicket {
        self.schedule_send(OutboundBody::notification(message, level, duration_ms))
    }

    /// Sends a UI element of any type.
    pub fn send_custom_ui_element(
        &self,
        element_type: impl Into<String>,
        data: Map<String, Value>,
    ) -> SendTicket {
        self.schedule_send(OutboundBody::custom_ui_element(element_type, data))
    }

    /// Sends an error report.
    pub fn send_error(&self, error: impl Into<String>, error_code: Option<String>) -> SendTicket {
        self.schedule_send(OutboundBody::error(error, error_code))
    }
}

enum TicketState {
    Ready(Option<Result<(), SendError>>),
    Pending(oneshot::Receiver<Result<(), SendError>>),
}

/// Outcome of a scheduled send.
///
/// Dropping the ticket does not cancel the send. Sends that fail before
/// reaching the queue are logged either way.
#[must_use = "a dropped ticket hides whether the send was written"]
pub struct SendTicket {
    state: TicketState,
}

impl SendTicket {
    fn ready(result: Result<(), SendError>) -> Self {
        Self {
            state: TicketState::Ready(Some(result)),
        }
    }

    fn pending(rx: oneshot::Receiver<Result<(), SendError>>) -> Self {
        Self {
            state: TicketState::Pending(rx),
        }
    }

    /// Waits until the send was written or failed.
    pub async fn wait(self) -> Result<(), SendError> {
        match self.state {
            TicketState::Ready(result) => result.unwrap_or(Err(SendError::Dropped)),
            TicketState::Pending(rx) => rx.await.unwrap_or(Err(SendError::Dropped)),
        }
    }

    /// Blocks the current thread until the send was written or failed.
    ///
    /// For plain threads only; panics if called from inside an async runtime.
    pub fn blocking_wait(self) -> Result<(), SendError> {
        match self.state {
            TicketState::Ready(result) => result.unwrap_or(Err(SendError::Dropped)),
            TicketState::Pending(rx) => rx.blocking_recv().unwrap_or(Err(SendError::Dropped)),
        }
    }

    /// Returns the outcome if it is known, without waiting.
    ///
    /// The outcome is handed out once.
    pub fn try_result(&mut self) -> Option<Result<(), SendError>> {
        match &mut self.state {
            TicketState::Ready(result) => result.take(),
            TicketState::Pending(rx) => match rx.try_recv() {
                Ok(result) => {
                    self.state = TicketState::Ready(None);
                    Some(result)
                }
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.state = TicketState::Ready(None);
                    Some(Err(SendError::Dropped))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender_in(
        state: SessionState,
    ) -> (
        OutboundSender,
        mpsc::UnboundedReceiver<OutboundRequest>,
        watch::Sender<SessionState>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state);
        (
            OutboundSender::new(tx, Arc::from("meeting-1"), state_rx),
            rx,
            state_tx,
        )
    }

    #[tokio::test]
    async fn not_connected_fails_immediately() {
        let (sender, mut rx, _state) = sender_in(SessionState::Connecting);
        let result = sender.send_text("hi", true).wait().await;
        assert!(matches!(result, Err(SendError::NotConnected)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_ticket_outcome_is_ready_without_waiting() {
        let (sender, mut rx, state) = sender_in(SessionState::Connecting);
        let mut ticket = sender.send_text("lost", true);
        assert!(matches!(ticket.try_result(), Some(Err(SendError::NotConnected))));

        state.send_replace(SessionState::Stopping);
        let mut ticket = sender.send_text("late", true);
        assert!(matches!(ticket.try_result(), Some(Err(SendError::SessionClosed))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ended_session_reports_closed() {
        let (sender, _rx, _state) = sender_in(SessionState::Rejected);
        assert!(matches!(
            sender.send_error("x", None).wait().await,
            Err(SendError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn requests_keep_submission_order() {
        let (sender, mut rx, _state) = sender_in(SessionState::Running);
        assert!(sender.is_connected());
        let first = sender.send_text("one", false);
        let second = sender.send_mcq_question("q1", "Pick", vec!["A".into()]);

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!(a.message.meeting_id(), "meeting-1");
        assert_eq!(a.message.body().type_name(), "generated_text");
        assert_eq!(b.message.body().type_name(), "custom_ui_element");

        a.finish(Ok(()));
        b.finish(Err(SendError::NotConnected));
        assert!(first.wait().await.is_ok());
        assert!(matches!(second.wait().await, Err(SendError::NotConnected)));
    }

    #[tokio::test]
    async fn unanswered_request_resolves_to_dropped() {
        let (sender, mut rx, _state) = sender_in(SessionState::Running);
        let mut ticket = sender.send_notification("n", NotificationLevel::Info, 8000);
        assert!(ticket.try_result().is_none());

        drop(rx.recv().await.unwrap());
        assert!(matches!(ticket.try_result(), Some(Err(SendError::Dropped))));
        assert!(ticket.try_result().is_none());
    }

    #[tokio::test]
    async fn closed_queue_reports_closed() {
        let (sender, rx, _state) = sender_in(SessionState::Running);
        drop(rx);
        assert!(matches!(
            sender.send_text("late", true).wait().await,
            Err(SendError::SessionClosed)
        ));
    }

    #[test]
    fn blocking_wait_from_plain_thread() {
        let (sender, mut rx, _state) = sender_in(SessionState::Running);
        let worker = std::thread::spawn(move || sender.send_text("from thread", true).blocking_wait());

        let request = loop {
            if let Ok(request) = rx.try_recv() {
                break request;
            }
            std::thread::yield_now();
        };
        request.finish(Ok(()));
        assert!(worker.join().unwrap().is_ok());
    }
}
