use std::fmt;

use tokio::sync::{mpsc, oneshot};

/// A request awaiting a response from the swarm driver task, paired with the
/// oneshot sender that delivers the answer back to the caller.
pub struct Message<Q, S, E> {
    pub request: Q,
    sender: oneshot::Sender<Result<S, E>>,
}

impl<Q, S, E> Message<Q, S, E> {
    /// Delivers `response` to the waiting caller. Returns `false` if the
    /// caller already dropped its receiver (e.g. it was cancelled).
    pub fn respond(self, response: Result<S, E>) -> bool {
        self.sender.send(response).is_ok()
    }
}

impl<Q: fmt::Debug, S, E> fmt::Debug for Message<Q, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").field("request", &self.request).finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("routing swarm task is no longer running")]
    SendError,
    #[error("routing swarm task dropped the response channel")]
    RecvError,
}

/// Sends requests to the swarm driver task and awaits its response.
pub struct CommandClient<Q, S, E> {
    tx: mpsc::UnboundedSender<Message<Q, S, E>>,
}

impl<Q, S, E> Clone for CommandClient<Q, S, E> {
    fn clone(&self) -> Self {
        CommandClient { tx: self.tx.clone() }
    }
}

impl<Q, S, E> CommandClient<Q, S, E> {
    pub async fn send(&self, request: Q) -> Result<Result<S, E>, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message { request, sender: tx })
            .map_err(|_| ChannelError::SendError)?;
        rx.await.map_err(|_| ChannelError::RecvError)
    }
}

/// Receives requests from the paired [CommandClient] inside the swarm driver
/// task's event loop.
pub struct CommandProcessor<Q, S, E> {
    rx: mpsc::UnboundedReceiver<Message<Q, S, E>>,
}

impl<Q, S, E> CommandProcessor<Q, S, E> {
    pub async fn recv(&mut self) -> Option<Message<Q, S, E>> {
        self.rx.recv().await
    }
}

pub fn command_channel<Q, S, E>() -> (CommandClient<Q, S, E>, CommandProcessor<Q, S, E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandClient { tx }, CommandProcessor { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_response_round_trips() {
        let (client, mut processor) = command_channel::<u32, u32, ()>();

        tokio::spawn(async move {
            let message = processor.recv().await.unwrap();
            let request = message.request;
            message.respond(Ok(request * 2));
        });

        let result = client.send(21).await.unwrap();
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn dropped_processor_yields_send_error() {
        let (client, processor) = command_channel::<u32, u32, ()>();
        drop(processor);
        assert!(matches!(client.send(1).await, Err(ChannelError::SendError)));
    }
}
