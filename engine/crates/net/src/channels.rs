use session::{SessionId, SessionOutput};
use tokio::sync::mpsc;

use crate::protocol::ClientRequest;

/// Messages from the network layer to the tick thread.
#[derive(Debug)]
pub enum NetToTick {
    /// A new WebSocket connection was accepted.
    NewConnection {
        session_id: SessionId,
    },
    /// A decoded, shape-checked client frame.
    Message {
        session_id: SessionId,
        request: ClientRequest,
    },
    /// Connection closed, by the peer or after a protocol violation.
    Disconnected {
        session_id: SessionId,
    },
}

/// Sender from network tasks to the tick thread.
pub type PlayerTx = mpsc::UnboundedSender<NetToTick>;
/// Receiver in the tick thread for player events.
pub type PlayerRx = mpsc::UnboundedReceiver<NetToTick>;

/// Sender from tick thread to the output router.
pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
/// Receiver in the output router for session outputs.
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Per-session write channel (tick thread -> output router -> session task).
pub type SessionWriteTx = mpsc::UnboundedSender<String>;
pub type SessionWriteRx = mpsc::UnboundedReceiver<String>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterSession {
    pub session_id: SessionId,
    pub write_tx: SessionWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterSession>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterSession>;

pub type UnregisterTx = mpsc::UnboundedSender<SessionId>;
pub type UnregisterRx = mpsc::UnboundedReceiver<SessionId>;

/// The network-side ends of every channel the server wires up.
#[derive(Debug, Clone)]
pub struct NetHandles {
    pub player_tx: PlayerTx,
    pub register_tx: RegisterTx,
    pub unregister_tx: UnregisterTx,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_roundtrip() {
        let (tx, mut rx) = mpsc::unbounded_channel::<NetToTick>();

        tx.send(NetToTick::NewConnection {
            session_id: SessionId(1),
        })
        .unwrap();
        tx.send(NetToTick::Message {
            session_id: SessionId(1),
            request: ClientRequest::Ready { name: None },
        })
        .unwrap();
        tx.send(NetToTick::Disconnected {
            session_id: SessionId(1),
        })
        .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), NetToTick::NewConnection { .. }));
        assert!(matches!(rx.recv().await.unwrap(), NetToTick::Message { .. }));
        assert!(matches!(rx.recv().await.unwrap(), NetToTick::Disconnected { .. }));
    }

    #[tokio::test]
    async fn output_channel_roundtrip() {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionOutput>();
        tx.send(SessionOutput::with_disconnect(SessionId(42), "bye")).unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.session_id, SessionId(42));
        assert_eq!(msg.text, "bye");
        assert!(msg.disconnect);
    }
}
