use std::sync::PoisonError;

use futures::future::join_all;
use tracing::{debug, info, warn};
use vfs_sync_core::VfsError;

use super::{unwatch_request, watch_request, VfsService};

/// Outcome of re-registering watchers after a reconnect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReestablishReport {
    /// Watch ids the worker confirmed again
    pub restored: Vec<String>,
    /// Watch ids the worker refused, with the reason
    pub failed: Vec<(String, VfsError)>,
}

impl ReestablishReport {
    /// Whether every watcher was restored.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl VfsService {
    /// Register every known watcher with the worker again, under its
    /// original watch id.
    ///
    /// All registrations run concurrently; one failure does not hold up the
    /// rest. Failed watchers stay registered locally so the next reconnect
    /// tries them again.
    pub(crate) async fn reestablish_watchers(&self) -> ReestablishReport {
        let targets: Vec<_> = self
            .inner
            .watchers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().kind(), entry.value().path.clone()))
            .collect();
        if targets.is_empty() {
            return ReestablishReport::default();
        }
        info!("Re-establishing {} watcher(s)", targets.len());

        let results = join_all(targets.into_iter().map(|(watch_id, kind, path)| async move {
            let result = self.request(watch_request(kind, &watch_id, &path)).await;
            (watch_id, kind, result)
        }))
        .await;

        let mut report = ReestablishReport::default();
        for (watch_id, kind, result) in results {
            match result {
                Ok(_) if !self.has_watcher(&watch_id) => {
                    // Unwatched while the registration was in flight
                    debug!("Watcher {} removed during re-establishment", watch_id);
                    if let Err(e) = self.request(unwatch_request(kind, &watch_id)).await {
                        debug!("Late unwatch of {} failed: {}", watch_id, e);
                    }
                }
                Ok(_) => report.restored.push(watch_id),
                Err(e) => {
                    warn!("Failed to re-establish watcher {}: {}", watch_id, e);
                    report.failed.push((watch_id, e));
                }
            }
        }
        info!(
            "Re-established {} watcher(s), {} failed",
            report.restored.len(),
            report.failed.len()
        );

        let listener = self
            .inner
            .reestablish_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(&report);
        }
        report
    }
}
