// 邮箱模块

use tokio::sync::mpsc;

use crate::message::{envelope, Envelope, Message};

/// Creates an unbounded, ordered mailbox.
///
/// The receiver becomes one agent's inbox. Senders are cheap to clone and
/// serve as outboxes for any number of producers.
pub fn mailbox() -> (MailboxSender, MailboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, MailboxReceiver { rx })
}

/// Producer endpoint of a mailbox.
#[derive(Clone, Debug)]
pub struct MailboxSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl MailboxSender {
    /// Enqueues without waiting. Hands the envelope back if the receiving
    /// side is gone.
    pub fn send(&self, message: Envelope) -> std::result::Result<(), Envelope> {
        self.tx.send(message).map_err(|err| err.0)
    }

    pub fn send_message<M: Message>(&self, message: M) -> std::result::Result<(), Envelope> {
        self.send(envelope(message))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// True when both senders feed the same mailbox.
    pub fn same_mailbox(&self, other: &MailboxSender) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Consumer endpoint of a mailbox. There is exactly one per mailbox.
#[derive(Debug)]
pub struct MailboxReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl MailboxReceiver {
    /// Waits for the next message. `None` once every sender is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
