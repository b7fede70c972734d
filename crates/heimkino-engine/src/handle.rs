use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::orchestrator::RecommendationOrchestrator;

/// Shareable handle for hosts that serve requests from several threads.
///
/// All access goes through one lock, so learning steps never interleave.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<RecommendationOrchestrator>>,
}

impl EngineHandle {
    #[must_use]
    pub fn new(orchestrator: RecommendationOrchestrator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(orchestrator)),
        }
    }

    /// Runs `f` with exclusive access to the orchestrator.
    pub fn with<T>(&self, f: impl FnOnce(&mut RecommendationOrchestrator) -> T) -> T {
        f(&mut self.lock())
    }

    /// Recovers a poisoned lock; a panicking caller closure leaves the model
    /// usable.
    fn lock(&self) -> MutexGuard<'_, RecommendationOrchestrator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use heimkino_core::{ContentMetadata, ContentType, GenreId};
    use std::thread;

    #[test]
    fn concurrent_registrations_all_land() {
        let handle = EngineHandle::new(RecommendationOrchestrator::new(EngineConfig::default()).unwrap());
        let workers: Vec<_> = (0..4)
            .map(|w| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        let meta = ContentMetadata {
                            content_id: format!("w{w}-{i}"),
                            title: None,
                            genres: vec![GenreId(18)],
                            content_type: ContentType::Series,
                            year: 2020,
                            duration_minutes: 45,
                            popularity: 1.0,
                            rating: None,
                            keywords: Vec::new(),
                        };
                        handle.with(|e| e.register_content(meta)).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(handle.with(|e| e.catalog_len()), 40);
    }
}
