//! Event dispatcher.
//!
//! Maps each [`EventKind`] to the handlers registered for it, in registration
//! order. Dispatching decodes the payload (if it is still raw), then calls
//! every handler of the kind one after another. A handler that returns an
//! error or panics is logged and skipped; the remaining handlers still run
//! and the caller never sees the failure.
//!
//! Custom UI responses take exactly one route: to the handlers of their
//! element subtype when that subtype has any, otherwise to the handlers of
//! [`EventKind::CustomUiResponse`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use framewise_core::EventKind;
use framewise_protocol::{DecodeError, Envelope, InboundEvent, decode_event, ui_response_raw};
use futures_util::FutureExt;
use tracing::{debug, error, trace, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::transport::BoxFuture;

type SyncFn = dyn Fn(&InboundEvent) -> HandlerResult + Send + Sync;
type SuspendingFn = dyn Fn(InboundEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync;

#[derive(Clone)]
enum Callback {
    Sync(Arc<SyncFn>),
    Suspending(Arc<SuspendingFn>),
}

/// An application callback bound to one event kind.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    callback: Callback,
}

impl Handler {
    /// Creates a handler that runs to completion without yielding.
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&InboundEvent) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            callback: Callback::Sync(Arc::new(f)),
        }
    }

    /// Creates a handler that may suspend.
    pub fn suspending<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            callback: Callback::Suspending(Arc::new(move |event| Box::pin(f(event)))),
        }
    }

    /// Returns the handler name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the handler may suspend.
    pub fn is_suspending(&self) -> bool {
        matches!(self.callback, Callback::Suspending(_))
    }

    async fn invoke(&self, event: &InboundEvent) -> HandlerResult {
        match &self.callback {
            Callback::Sync(f) => catch_unwind(AssertUnwindSafe(|| f(event)))
                .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic)))),
            Callback::Suspending(f) => {
                let future = match catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
                    Ok(future) => future,
                    Err(panic) => return Err(HandlerError::Panicked(panic_message(&*panic))),
                };
                AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic))))
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("suspending", &self.is_suspending())
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Identifies one registration, for [`EventDispatcher::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What to dispatch: a raw envelope or an already typed event.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Decoded on dispatch, and only if someone listens.
    Raw(Envelope),
    /// Delivered as is.
    Typed(InboundEvent),
}

impl From<Envelope> for Payload {
    fn from(envelope: Envelope) -> Self {
        Self::Raw(envelope)
    }
}

impl From<InboundEvent> for Payload {
    fn from(event: InboundEvent) -> Self {
        Self::Typed(event)
    }
}

/// Result of one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Kind whose handlers were selected.
    pub kind: EventKind,
    /// Number of handlers called.
    pub invoked: usize,
    /// Number of those that failed.
    pub failed: usize,
    /// True if the payload could not be decoded and nothing was called.
    pub decode_failed: bool,
}

impl DispatchSummary {
    fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            invoked: 0,
            failed: 0,
            decode_failed: false,
        }
    }
}

struct Registration {
    id: HandlerId,
    handler: Handler,
}

/// Registry of handlers per event kind.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.read().keys().map(ToString::to_string).collect();
        f.debug_struct("EventDispatcher").field("kinds", &kinds).finish()
    }
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<EventKind, Vec<Registration>>> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<EventKind, Vec<Registration>>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a handler to the list of `kind`.
    pub fn register(&self, kind: impl Into<EventKind>, handler: Handler) -> HandlerId {
        let kind = kind.into();
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(kind = %kind, handler = %handler.name(), "registering handler");
        self.write()
            .entry(kind)
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Removes a registration. Returns false if it was not registered for `kind`.
    pub fn unregister(&self, kind: impl Into<EventKind>, id: HandlerId) -> bool {
        let kind = kind.into();
        let mut handlers = self.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|registration| registration.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    /// Returns true if `kind` has at least one handler.
    pub fn has_handlers(&self, kind: &EventKind) -> bool {
        self.read().get(kind).is_some_and(|list| !list.is_empty())
    }

    /// Returns the number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.read().get(kind).map_or(0, Vec::len)
    }

    fn has_ui_handlers(&self) -> bool {
        self.read()
            .keys()
            .any(|kind| *kind == EventKind::CustomUiResponse || kind.is_ui_element())
    }

    /// Copies the handler list of `kind`, in registration order.
    fn snapshot(&self, kind: &EventKind) -> Vec<Handler> {
        self.read()
            .get(kind)
            .map(|list| list.iter().map(|r| r.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Delivers one payload to the handlers of `kind`.
    ///
    /// Never fails: decode errors and handler failures are logged and
    /// reported in the summary.
    pub async fn dispatch(&self, kind: &EventKind, payload: impl Into<Payload>) -> DispatchSummary {
        let wanted = if *kind == EventKind::CustomUiResponse {
            self.has_ui_handlers()
        } else {
            self.has_handlers(kind)
        };
        if !wanted {
            trace!(kind = %kind, "no handlers registered");
            return DispatchSummary::empty(kind.clone());
        }

        let event = match payload.into() {
            Payload::Typed(event) => event,
            Payload::Raw(envelope) => match decode_with_fallback(&envelope) {
                Ok(event) => event,
                Err(e) => {
                    error!(kind = %kind, error = %e, "failed to decode event, skipping handlers");
                    return DispatchSummary {
                        decode_failed: true,
                        ..DispatchSummary::empty(kind.clone())
                    };
                }
            },
        };

        let (target, event) = self.route(kind, event);
        let handlers = self.snapshot(&target);
        let mut summary = DispatchSummary::empty(target);

        for handler in &handlers {
            summary.invoked += 1;
            if let Err(e) = handler.invoke(&event).await {
                summary.failed += 1;
                error!(
                    kind = %summary.kind,
                    handler = %handler.name(),
                    error = %e,
                    "handler failed"
                );
            }
        }
        summary
    }

    /// Picks the single handler list a custom UI response goes to.
    fn route(&self, kind: &EventKind, event: InboundEvent) -> (EventKind, InboundEvent) {
        if let InboundEvent::CustomUiResponse(response) = &event {
            let subtype = response.element_kind();
            if subtype.is_ui_element() && self.has_handlers(&subtype) {
                trace!(subtype = %subtype, "routing custom UI response to subtype handlers");
                return (subtype, InboundEvent::UiElement(response.clone()));
            }
        }
        (kind.clone(), event)
    }
}

/// Decodes an envelope, degrading UI responses to raw data on schema mismatch.
fn decode_with_fallback(envelope: &Envelope) -> Result<InboundEvent, DecodeError> {
    match decode_event(envelope) {
        Ok(event) => Ok(event),
        Err(err @ DecodeError::SchemaMismatch { .. }) => {
            let is_ui = envelope.kind == EventKind::CustomUiResponse || envelope.kind.is_ui_element();
            match ui_response_raw(envelope).filter(|_| is_ui) {
                Some(response) => {
                    warn!(kind = %envelope.kind, error = %err, "UI data did not match its schema, delivering raw");
                    Ok(if envelope.kind == EventKind::CustomUiResponse {
                        InboundEvent::CustomUiResponse(response)
                    } else {
                        InboundEvent::UiElement(response)
                    })
                }
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> Handler {
        let log = Arc::clone(log);
        Handler::sync(label, move |_| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        })
    }

    fn transcript_envelope(text: &str) -> Envelope {
        Envelope::new(
            EventKind::Transcript,
            json!({"text": text, "is_final": true}),
        )
    }

    #[tokio::test]
    async fn handlers_run_once_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.register(EventKind::Transcript, recorder(&log, "first"));
        dispatcher.register("transcript", recorder(&log, "second"));
        dispatcher.register(EventKind::Transcript, recorder(&log, "third"));

        let summary = dispatcher
            .dispatch(&EventKind::Transcript, transcript_envelope("hi"))
            .await;

        assert_eq!(summary.invoked, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failing_handlers_do_not_stop_the_rest() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.register(EventKind::Transcript, recorder(&log, "before"));
        dispatcher.register(
            EventKind::Transcript,
            Handler::sync("fails", |_| Err(HandlerError::new("boom"))),
        );
        dispatcher.register(
            EventKind::Transcript,
            Handler::sync("panics", |_| panic!("handler bug")),
        );
        dispatcher.register(
            EventKind::Transcript,
            Handler::suspending("async_fails", |_| async {
                Err::<(), _>(HandlerError::new("later"))
            }),
        );
        dispatcher.register(
            EventKind::Transcript,
            Handler::suspending("async_panics", |_| async {
                let broken = true;
                if broken {
                    panic!("async bug");
                }
                Ok::<(), HandlerError>(())
            }),
        );
        dispatcher.register(EventKind::Transcript, recorder(&log, "after"));

        let summary = dispatcher
            .dispatch(&EventKind::Transcript, transcript_envelope("hi"))
            .await;

        assert_eq!(summary.invoked, 6);
        assert_eq!(summary.failed, 4);
        assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn suspending_handler_receives_typed_event() {
        let dispatcher = EventDispatcher::new();
        let seen: Log = Arc::default();
        let sink = Arc::clone(&seen);
        dispatcher.register(
            EventKind::Transcript,
            Handler::suspending("collect", move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    tokio::task::yield_now().await;
                    if let InboundEvent::Transcript(t) = event {
                        sink.lock().unwrap().push(t.text);
                    }
                    Ok::<(), HandlerError>(())
                }
            }),
        );

        dispatcher
            .dispatch(&EventKind::Transcript, transcript_envelope("async hello"))
            .await;
        assert_eq!(*seen.lock().unwrap(), vec!["async hello"]);
    }

    #[tokio::test]
    async fn unregistered_kind_is_a_no_op() {
        let dispatcher = EventDispatcher::new();
        let summary = dispatcher
            .dispatch(&EventKind::Exit, Envelope::new(EventKind::Exit, json!({})))
            .await;
        assert_eq!(summary, DispatchSummary::empty(EventKind::Exit));
    }

    #[tokio::test]
    async fn malformed_content_never_reaches_handlers() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.register(EventKind::Join, recorder(&log, "join"));

        let summary = dispatcher
            .dispatch(
                &EventKind::Join,
                Envelope::new(EventKind::Join, json!({"participant_id": 3})),
            )
            .await;

        assert!(summary.decode_failed);
        assert_eq!(summary.invoked, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregister_removes_only_that_handler() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        let first = dispatcher.register(EventKind::Transcript, recorder(&log, "first"));
        dispatcher.register(EventKind::Transcript, recorder(&log, "second"));

        assert!(dispatcher.unregister(EventKind::Transcript, first));
        assert!(!dispatcher.unregister(EventKind::Transcript, first));
        assert!(!dispatcher.unregister(EventKind::Exit, first));
        assert_eq!(dispatcher.handler_count(&EventKind::Transcript), 1);

        dispatcher
            .dispatch(&EventKind::Transcript, transcript_envelope("x"))
            .await;
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn registration_during_dispatch_applies_next_time() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let log: Log = Arc::default();

        let inner = Arc::clone(&dispatcher);
        let inner_log = Arc::clone(&log);
        dispatcher.register(
            EventKind::Transcript,
            Handler::sync("registers", move |_| {
                inner.register(EventKind::Transcript, recorder(&inner_log, "late"));
                Ok(())
            }),
        );

        let summary = dispatcher
            .dispatch(&EventKind::Transcript, transcript_envelope("1"))
            .await;
        assert_eq!(summary.invoked, 1);
        assert!(log.lock().unwrap().is_empty());

        let summary = dispatcher
            .dispatch(&EventKind::Transcript, transcript_envelope("2"))
            .await;
        assert_eq!(summary.invoked, 2);
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    fn mcq_response_envelope() -> Envelope {
        Envelope::new(
            EventKind::CustomUiResponse,
            json!({"type": "mcq_question", "data": {"id": "q1", "selectedIndex": 0}}),
        )
    }

    #[tokio::test]
    async fn custom_ui_response_goes_to_subtype_when_registered() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.register(EventKind::CustomUiResponse, recorder(&log, "generic"));
        dispatcher.register(EventKind::McqQuestion, recorder(&log, "mcq"));

        let summary = dispatcher
            .dispatch(&EventKind::CustomUiResponse, mcq_response_envelope())
            .await;

        assert_eq!(summary.kind, EventKind::McqQuestion);
        assert_eq!(*log.lock().unwrap(), vec!["mcq"]);
    }

    #[tokio::test]
    async fn custom_ui_response_falls_back_to_generic_handlers() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.register(EventKind::CustomUiResponse, recorder(&log, "generic"));
        dispatcher.register(EventKind::Calendly, recorder(&log, "calendly"));

        let summary = dispatcher
            .dispatch(&EventKind::CustomUiResponse, mcq_response_envelope())
            .await;

        assert_eq!(summary.kind, EventKind::CustomUiResponse);
        assert_eq!(*log.lock().unwrap(), vec!["generic"]);
    }

    #[tokio::test]
    async fn bad_ui_data_is_delivered_raw() {
        let dispatcher = EventDispatcher::new();
        let seen: Arc<Mutex<Option<InboundEvent>>> = Arc::default();
        let sink = Arc::clone(&seen);
        dispatcher.register(
            EventKind::McqQuestion,
            Handler::sync("mcq", move |event| {
                *sink.lock().unwrap() = Some(event.clone());
                Ok(())
            }),
        );

        let envelope = Envelope::new(
            EventKind::CustomUiResponse,
            json!({"type": "mcq_question", "data": {"selectedOption": "B"}}),
        );
        let summary = dispatcher
            .dispatch(&EventKind::CustomUiResponse, envelope)
            .await;

        assert_eq!(summary.invoked, 1);
        let event = seen.lock().unwrap().take().unwrap();
        let response = event.ui_response().unwrap();
        assert_eq!(response.raw_data().unwrap()["selectedOption"], "B");
    }

    #[tokio::test]
    async fn typed_payload_skips_decoding() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.register(EventKind::Join, recorder(&log, "join"));

        let event = InboundEvent::Join(framewise_protocol::ParticipantEvent {
            meeting_id: "m".into(),
            participant_id: "p".into(),
            participant_name: None,
            participant_role: None,
        });
        let summary = dispatcher.dispatch(&EventKind::Join, event).await;
        assert_eq!(summary.invoked, 1);
    }
}
