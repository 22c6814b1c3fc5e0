//! Cleanup registry run on shutdown, in registration order.

use std::future::Future;
use std::pin::Pin;

type CleanupFn = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Default)]
pub struct CleanupRegistry {
    cleanups: Vec<CleanupFn>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, cleanup: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cleanups.push(Box::new(move || Box::pin(cleanup())));
    }

    pub async fn run_all(&self) {
        for cleanup in &self.cleanups {
            cleanup().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn cleanups_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = CleanupRegistry::new();

        let o1 = order.clone();
        registry.register(move || {
            let o1 = o1.clone();
            async move { o1.lock().unwrap().push(1) }
        });
        let o2 = order.clone();
        registry.register(move || {
            let o2 = o2.clone();
            async move { o2.lock().unwrap().push(2) }
        });

        registry.run_all().await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
