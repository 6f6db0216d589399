//! Transport seam for the companion relay.
//!
//! The relay only needs three things from whatever bidirectional channel
//! connects the two devices: send a message, deliver inbound messages, and
//! report connectivity changes. Reachability is pushed by the transport on
//! every change; the relay never probes synchronously.

use super::message::RelayMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Events delivered from the transport into the relay inbox.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound message from the peer.
    Message(RelayMessage),
    /// The link to the peer came up or went down.
    ReachabilityChanged(bool),
}

/// Minimal contract the relay needs from the device-pair channel.
pub trait RelayTransport: Send + Sync {
    /// Transmit a message toward the peer. Errors mean the transport itself
    /// rejected the send; silent loss is reported via timeouts instead.
    fn send(&self, message: RelayMessage) -> anyhow::Result<()>;

    /// Register the inbox that receives inbound messages and reachability
    /// changes. Called once by the relay at construction.
    fn register_inbound(&self, inbox: Sender<TransportEvent>);
}

/// In-process transport pair for tests and same-host demos.
///
/// Simulates an unreliable device link: while the link is down, sends are
/// accepted and silently dropped (a radio black hole), which exercises the
/// ack-timeout path. `fail_sends` makes `send` itself error, exercising the
/// failed-send path.
#[derive(Clone)]
pub struct InProcessTransport {
    local_inbox: Arc<Mutex<Option<Sender<TransportEvent>>>>,
    peer_inbox: Arc<Mutex<Option<Sender<TransportEvent>>>>,
    link_up: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl InProcessTransport {
    /// Create a connected pair of transports sharing one link state.
    pub fn pair() -> (InProcessTransport, InProcessTransport) {
        let a_inbox = Arc::new(Mutex::new(None));
        let b_inbox = Arc::new(Mutex::new(None));
        let link_up = Arc::new(AtomicBool::new(true));

        let a = InProcessTransport {
            local_inbox: Arc::clone(&a_inbox),
            peer_inbox: Arc::clone(&b_inbox),
            link_up: Arc::clone(&link_up),
            fail_sends: Arc::new(AtomicBool::new(false)),
        };
        let b = InProcessTransport {
            local_inbox: b_inbox,
            peer_inbox: a_inbox,
            link_up,
            fail_sends: Arc::new(AtomicBool::new(false)),
        };
        (a, b)
    }

    /// Flip the shared link state and notify both ends.
    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
        for inbox in [&self.local_inbox, &self.peer_inbox] {
            if let Ok(guard) = inbox.lock() {
                if let Some(sender) = guard.as_ref() {
                    let _ = sender.send(TransportEvent::ReachabilityChanged(up));
                }
            }
        }
    }

    /// Make subsequent `send` calls fail outright.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }
}

impl RelayTransport for InProcessTransport {
    fn send(&self, message: RelayMessage) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("transport rejected send");
        }
        if !self.link_up.load(Ordering::SeqCst) {
            // Link is down: the radio accepts the frame and loses it.
            return Ok(());
        }
        if let Ok(guard) = self.peer_inbox.lock() {
            if let Some(sender) = guard.as_ref() {
                let _ = sender.send(TransportEvent::Message(message));
            }
        }
        Ok(())
    }

    fn register_inbound(&self, inbox: Sender<TransportEvent>) {
        if let Ok(mut guard) = self.local_inbox.lock() {
            *guard = Some(inbox);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use uuid::Uuid;

    #[test]
    fn test_pair_delivers_messages_across() {
        let (a, b) = InProcessTransport::pair();
        let (tx, rx) = mpsc::channel();
        b.register_inbound(tx);

        let message = RelayMessage::ack(Uuid::new_v4());
        a.send(message.clone()).unwrap();

        match rx.recv().unwrap() {
            TransportEvent::Message(received) => assert_eq!(received, message),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_link_down_drops_messages_silently() {
        let (a, b) = InProcessTransport::pair();
        let (tx, rx) = mpsc::channel();
        b.register_inbound(tx);

        a.set_link_up(false);
        // The reachability change itself is delivered.
        assert!(matches!(
            rx.recv().unwrap(),
            TransportEvent::ReachabilityChanged(false)
        ));

        a.send(RelayMessage::ack(Uuid::new_v4())).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fail_sends_errors() {
        let (a, _b) = InProcessTransport::pair();
        a.set_fail_sends(true);
        assert!(a.send(RelayMessage::ack(Uuid::new_v4())).is_err());
    }
}
