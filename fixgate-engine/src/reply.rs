/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Completion token for asynchronous engine operations.

use crate::error::EngineError;
use tokio::sync::oneshot;

/// Result of an operation running on another task.
///
/// The caller must await [`Reply::wait`] (or poll [`Reply::try_take`])
/// before inspecting anything the operation produced.
#[derive(Debug)]
#[must_use = "a reply does nothing unless awaited"]
pub struct Reply<T> {
    rx: oneshot::Receiver<Result<T, EngineError>>,
}

/// Sending half of a [`Reply`].
#[derive(Debug)]
pub struct ReplySender<T> {
    tx: oneshot::Sender<Result<T, EngineError>>,
}

impl<T> Reply<T> {
    /// Creates a connected sender and reply.
    pub fn channel() -> (ReplySender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (ReplySender { tx }, Self { rx })
    }

    /// Waits for the operation to complete.
    ///
    /// # Errors
    /// Returns the operation's error, or `EngineError::Closed` if it was
    /// dropped without completing.
    pub async fn wait(self) -> Result<T, EngineError> {
        self.rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Returns the result if the operation has completed.
    pub fn try_take(&mut self) -> Option<Result<T, EngineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(EngineError::Closed)),
        }
    }
}

impl<T> ReplySender<T> {
    /// Completes the reply. A dropped reply is ignored.
    pub fn send(self, result: Result<T, EngineError>) {
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_completes() {
        let (tx, reply) = Reply::channel();
        tokio::spawn(async move { tx.send(Ok(7)) });
        assert_eq!(reply.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_sender_closes_reply() {
        let (tx, reply) = Reply::<u32>::channel();
        drop(tx);
        assert!(matches!(reply.wait().await, Err(EngineError::Closed)));
    }

    #[test]
    fn test_try_take() {
        let (tx, mut reply) = Reply::channel();
        assert!(reply.try_take().is_none());
        tx.send(Ok("done"));
        assert_eq!(reply.try_take().unwrap().unwrap(), "done");
    }
}
