// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;

use tokio::sync::watch;

/// Cancels the operations holding its [`AbortSignal`]s.
///
/// ```rust
/// # use azure_data_cosmos_core::AbortController;
/// let controller = AbortController::new();
/// let signal = controller.signal();
/// assert!(!signal.is_aborted());
/// controller.abort();
/// assert!(signal.is_aborted());
/// ```
#[derive(Clone, Debug)]
pub struct AbortController {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Aborts every operation observing this controller. Aborting twice has no further effect.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes an [`AbortController`].
#[derive(Clone, Debug)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes once the controller aborts. Never completes if the controller is dropped first.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Runs `future` unless `signal` fires first.
pub(crate) async fn abortable<F, T>(signal: Option<&AbortSignal>, future: F) -> azure_core::Result<T>
where
    F: std::future::Future<Output = azure_core::Result<T>>,
{
    match signal {
        None => future.await,
        Some(signal) if signal.is_aborted() => Err(crate::error::cancelled()),
        Some(signal) => tokio::select! {
            result = future => result,
            _ = signal.aborted() => Err(crate::error::cancelled()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CosmosErrorExt;
    use std::time::Duration;

    #[tokio::test]
    async fn abort_wakes_waiters() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let waiter = tokio::spawn(async move { signal.aborted().await });
        controller.abort();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abortable_drops_pending_future() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let pending = abortable(Some(&signal), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        tokio::pin!(pending);

        tokio::select! {
            _ = &mut pending => panic!("future should still be pending"),
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        controller.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn already_aborted_signal_fails_fast() {
        let controller = AbortController::new();
        controller.abort();
        let result = abortable(Some(&controller.signal()), async { Ok(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
