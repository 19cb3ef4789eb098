use engine_core::EventBus;
use net::ServerMessage;
use session::{SessionId, SessionOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub message: ServerMessage,
    /// Close the connection after this frame.
    pub disconnect: bool,
}

/// Messages produced during a tick, queued per recipient in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    bus: EventBus<SessionId, Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, session: SessionId, message: ServerMessage) {
        self.bus.emit(
            session,
            Outgoing {
                message,
                disconnect: false,
            },
        );
    }

    /// Queue a last frame; the connection closes after it is delivered.
    pub fn send_final(&mut self, session: SessionId, message: ServerMessage) {
        self.bus.emit(
            session,
            Outgoing {
                message,
                disconnect: true,
            },
        );
    }

    /// Messages queued for one session, draining them.
    pub fn take(&mut self, session: SessionId) -> Vec<ServerMessage> {
        self.bus.drain(session).into_iter().map(|o| o.message).collect()
    }

    /// Encode everything queued as wire frames, sorted by session.
    pub fn drain_outputs(&mut self) -> Vec<SessionOutput> {
        let mut out = Vec::with_capacity(self.bus.len());
        for (session, queue) in self.bus.drain_all() {
            for item in queue {
                let text = item.message.to_json();
                out.push(if item.disconnect {
                    SessionOutput::with_disconnect(session, text)
                } else {
                    SessionOutput::new(session, text)
                });
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.bus.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.bus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_outputs_keeps_order_and_disconnect_flag() {
        let mut outbox = Outbox::new();
        outbox.send(SessionId(2), ServerMessage::ChangeArea {});
        outbox.send(SessionId(1), ServerMessage::error("first"));
        outbox.send_final(SessionId(1), ServerMessage::error("last"));

        let outputs = outbox.drain_outputs();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].session_id, SessionId(1));
        assert!(!outputs[0].disconnect);
        assert!(outputs[1].text.contains("last"));
        assert!(outputs[1].disconnect);
        assert_eq!(outputs[2].session_id, SessionId(2));
        assert!(outbox.is_empty());
    }

    #[test]
    fn take_drains_one_session() {
        let mut outbox = Outbox::new();
        outbox.send(SessionId(1), ServerMessage::ChangeArea {});
        outbox.send(SessionId(2), ServerMessage::ChangeArea {});
        assert_eq!(outbox.take(SessionId(1)), vec![ServerMessage::ChangeArea {}]);
        assert!(outbox.take(SessionId(1)).is_empty());
        assert_eq!(outbox.drain_outputs().len(), 1);
    }
}
