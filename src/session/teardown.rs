use super::{SessionHandle, SessionRecordStore};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Outcome of a teardown; failures are logged, never returned as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Stored sessions a delete was attempted for.
    pub attempted: usize,
    pub failed: usize,
    /// The subject index could not be read, so no stored session was touched.
    pub lookup_failed: bool,
    /// `Some(true)` when a local session was passed in and removed.
    pub local_destroyed: Option<bool>,
}

/// Removes every stored session owned by a subject.
#[derive(Clone)]
pub struct SessionTeardown {
    store: Arc<dyn SessionRecordStore>,
}

impl SessionTeardown {
    #[must_use]
    pub fn new(store: Arc<dyn SessionRecordStore>) -> Self {
        Self { store }
    }

    /// Delete all sessions indexed under `subject_id`, then the local one.
    ///
    /// Deletes run concurrently; one failing does not stop the others. The
    /// local session is destroyed even if the index lookup failed.
    pub async fn destroy_all_sessions_for_subject(
        &self,
        local: Option<&SessionHandle>,
        subject_id: &str,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();

        match self.store.list_ids_by_subject(subject_id).await {
            Ok(ids) => {
                let (attempted, failed) = self.delete_all(ids).await;
                report.attempted = attempted;
                report.failed = failed;
            }
            Err(err) => {
                error!("session-store - failed to list sessions for subject: {err}");
                report.lookup_failed = true;
            }
        }

        if let Some(local) = local {
            match local.destroy(self.store.as_ref()).await {
                Ok(()) => report.local_destroyed = Some(true),
                Err(err) => {
                    error!("session-store - failed to destroy local session: {err}");
                    report.local_destroyed = Some(false);
                }
            }
        }

        debug!(
            attempted = report.attempted,
            failed = report.failed,
            "session teardown finished"
        );
        report
    }

    async fn delete_all(&self, ids: Vec<String>) -> (usize, usize) {
        let mut tasks = JoinSet::new();
        for id in ids {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move { store.delete_by_id(&id).await });
        }

        let mut attempted = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            attempted += 1;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    debug!("session-store - delete failed: {err}");
                }
                Err(err) => {
                    failed += 1;
                    error!("session-store - delete task aborted: {err}");
                }
            }
        }

        if failed > 0 {
            warn!("session-store - failed to delete sessions: {failed} out of {attempted} failed");
        }
        (attempted, failed)
    }
}
