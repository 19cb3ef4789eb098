use std::collections::BTreeMap;

use session::{SessionId, SessionOutput};

use crate::channels::{OutputRx, RegisterRx, RegisterSession, SessionWriteTx, UnregisterRx};

/// Per-session writers known to the router.
#[derive(Debug, Default)]
struct Writers {
    by_session: BTreeMap<SessionId, SessionWriteTx>,
}

impl Writers {
    fn register(&mut self, reg: RegisterSession) {
        tracing::debug!(session_id = ?reg.session_id, "output router: session registered");
        self.by_session.insert(reg.session_id, reg.write_tx);
    }

    fn unregister(&mut self, session_id: SessionId) {
        if self.by_session.remove(&session_id).is_some() {
            tracing::debug!(?session_id, "output router: session unregistered");
        }
    }

    /// Deliver one frame. Dropping the writer after a disconnect frame ends
    /// the session's writer task once the frame is flushed.
    fn deliver(&mut self, output: SessionOutput) {
        let Some(tx) = self.by_session.get(&output.session_id) else {
            tracing::trace!(session_id = ?output.session_id, "output router: no writer, frame dropped");
            return;
        };
        if tx.send(output.text).is_err() {
            tracing::debug!(session_id = ?output.session_id, "output router: write channel closed");
            self.by_session.remove(&output.session_id);
        } else if output.disconnect {
            tracing::debug!(session_id = ?output.session_id, "output router: disconnect requested, dropping writer");
            self.by_session.remove(&output.session_id);
        }
    }
}

/// Routes SessionOutput messages to the correct per-session write channel.
pub async fn run_output_router(
    mut output_rx: OutputRx,
    mut register_rx: RegisterRx,
    mut unregister_rx: UnregisterRx,
) {
    let mut writers = Writers::default();

    loop {
        tokio::select! {
            // Registrations first so a frame never overtakes its session's writer.
            biased;
            Some(reg) = register_rx.recv() => writers.register(reg),
            Some(session_id) = unregister_rx.recv() => writers.unregister(session_id),
            Some(output) = output_rx.recv() => writers.deliver(output),
            else => break,
        }
    }

    tracing::info!("output router shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn disconnect_frame_is_delivered_then_writer_dropped() {
        let mut writers = Writers::default();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        writers.register(RegisterSession {
            session_id: SessionId(1),
            write_tx,
        });

        writers.deliver(SessionOutput::with_disconnect(SessionId(1), "bye"));
        assert_eq!(write_rx.try_recv().unwrap(), "bye");
        // Writer gone: the channel reports disconnected, not empty.
        assert!(matches!(
            write_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn router_delivers_messages() {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();

        let router_handle = tokio::spawn(run_output_router(output_rx, register_rx, unregister_rx));

        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        let sid = SessionId(1);
        register_tx
            .send(RegisterSession {
                session_id: sid,
                write_tx,
            })
            .unwrap();
        output_tx.send(SessionOutput::new(sid, "hello")).unwrap();

        assert_eq!(write_rx.recv().await.unwrap(), "hello");

        unregister_tx.send(sid).unwrap();
        // Once unregistered the router holds no sender, so the channel closes.
        assert!(write_rx.recv().await.is_none());

        drop(output_tx);
        drop(register_tx);
        drop(unregister_tx);
        let _ = router_handle.await;
    }
}
