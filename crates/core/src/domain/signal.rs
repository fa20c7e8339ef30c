// Stop signal for graceful termination and cancellation
//
// Used for pool shutdown, retiring a single worker, and cancelling an
// in-flight external command.

use tokio::sync::watch;

/// Receiving side of a stop signal
#[derive(Clone, Debug)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    /// Check if stop was requested
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the stop signal.
    ///
    /// Never resolves if the handle is dropped without signalling, so a
    /// finished owner cannot be mistaken for a stop request.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Sending side of a stop signal
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Signal stop to every token cloned from this channel
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create another token observing this handle
    pub fn token(&self) -> StopToken {
        StopToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a stop channel
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_stop() {
        let (handle, mut token) = stop_channel();
        assert!(!token.is_stopped());

        let waiter = tokio::spawn(async move {
            token.wait().await;
            true
        });
        handle.stop();

        assert!(waiter.await.unwrap());
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_dropped_handle_is_not_a_stop() {
        let (handle, mut token) = stop_channel();
        drop(handle);

        let waited = tokio::time::timeout(Duration::from_millis(50), token.wait()).await;
        assert!(waited.is_err(), "dropping the handle must not signal stop");
    }

    #[tokio::test]
    async fn test_token_created_after_stop_sees_it() {
        let (handle, _token) = stop_channel();
        handle.stop();
        let mut late = handle.token();
        assert!(late.is_stopped());
        late.wait().await;
    }
}
