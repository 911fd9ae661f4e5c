//! Outbound message sink
//!
//! Handlers hand replies to an [`Outbox`]; delivery is the transport's job.

use crate::{message::Message, protocol::Protocol, Error, Result};
use tokio::sync::mpsc;
use tracing::debug;

/// Fire-and-forget sink for outbound protocol messages
pub trait Outbox<P: Protocol> {
    /// Queue a message for delivery
    fn put_message(&mut self, message: Message<P>) -> Result<()>;
}

/// In-memory outbox, keeps every message in order
impl<P: Protocol> Outbox<P> for Vec<Message<P>> {
    fn put_message(&mut self, message: Message<P>) -> Result<()> {
        self.push(message);
        Ok(())
    }
}

/// Outbox backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelOutbox<P: Protocol> {
    sender: mpsc::UnboundedSender<Message<P>>,
}

impl<P: Protocol> ChannelOutbox<P> {
    /// Create an outbox and the receiver the transport drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message<P>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl<P: Protocol> Outbox<P> for ChannelOutbox<P> {
    fn put_message(&mut self, message: Message<P>) -> Result<()> {
        debug!(protocol = P::NAME, to = %message.to, "queueing outbound message");
        self.sender
            .send(message)
            .map_err(|_| Error::Outbox("outbound channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DialogueReference;
    use crate::protocols::tendermint::{Tendermint, TendermintBody};

    fn message() -> Message<Tendermint> {
        Message {
            message_id: 1,
            target: 0,
            dialogue_reference: DialogueReference::new("n"),
            sender: "a".to_string(),
            to: "b".to_string(),
            body: TendermintBody::Request { query: None },
        }
    }

    #[tokio::test]
    async fn test_channel_outbox_delivers() {
        let (mut outbox, mut receiver) = ChannelOutbox::<Tendermint>::new();
        outbox.put_message(message()).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, message());
    }

    #[test]
    fn test_channel_outbox_closed() {
        let (mut outbox, receiver) = ChannelOutbox::<Tendermint>::new();
        drop(receiver);

        assert!(matches!(
            outbox.put_message(message()),
            Err(Error::Outbox(_))
        ));
    }
}
