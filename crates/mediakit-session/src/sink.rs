use mediakit_models::{Notification, SessionEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// The single observer of a session.
///
/// Implemented for closures and for tokio unbounded senders, so an adapter can
/// either handle events inline or forward them to its own channel task.
pub trait NotificationSink: Send {
    fn notify(&self, event: SessionEvent);
}

impl<F> NotificationSink for F
where
    F: Fn(SessionEvent) + Send,
{
    fn notify(&self, event: SessionEvent) {
        self(event)
    }
}

impl NotificationSink for mpsc::UnboundedSender<SessionEvent> {
    fn notify(&self, event: SessionEvent) {
        if self.send(event).is_err() {
            debug!("notification receiver dropped");
        }
    }
}

/// Tags notifications with the session id and forwards them to the sink.
pub(crate) struct Notifier {
    session_id: String,
    sink: Box<dyn NotificationSink>,
}

impl Notifier {
    pub(crate) fn new(session_id: String, sink: Box<dyn NotificationSink>) -> Self {
        Self { session_id, sink }
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn emit(&self, notification: Notification) {
        trace!(session = %self.session_id, event = notification.event_name(), "notify");
        self.sink
            .notify(SessionEvent::new(self.session_id.clone(), notification));
    }
}
