//! A trailing-edge debouncer for the replica push trigger, default
//! 1s debounce.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

pub struct PushDebouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl PushDebouncer {
    /// Spawns the debounce task. Each [`trigger`](Self::trigger) call
    /// resets the quiet-period timer; `callback` only runs once the
    /// timer elapses without a new trigger.
    pub fn spawn<F, Fut>(debounce: Duration, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            loop {
                if rx.recv().await.is_none() {
                    return;
                }
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(debounce) => break,
                        next = rx.recv() => {
                            if next.is_none() {
                                return;
                            }
                        }
                    }
                }
                callback().await;
            }
        });

        Self { tx }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn rapid_triggers_within_the_window_coalesce_into_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let debouncer = PushDebouncer::spawn(Duration::from_millis(50), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        debouncer.trigger();
        tokio::time::advance(Duration::from_millis(10)).await;
        debouncer.trigger();
        tokio::time::advance(Duration::from_millis(10)).await;
        debouncer.trigger();
        tokio::time::advance(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
