use std::{future::Future, sync::Arc};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{RegistryError, Result},
    handle::TaskHandle,
    id::JobId,
    job::{Job, Routine},
    registry::JobRegistry,
};

/// Runs work in the background and keeps the registry in step with it.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    runtime: Handle,
}

impl JobRunner {
    /// Binds to the runtime of the caller.
    pub fn new(registry: Arc<JobRegistry>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        Ok(Self::with_runtime(registry, runtime))
    }

    pub fn with_runtime(registry: Arc<JobRegistry>, runtime: Handle) -> Self {
        JobRunner { registry, runtime }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Starts `work` and returns its id right away. Errors from `work` end up
    /// in the registry as a failed job, never here.
    pub fn submit<F>(&self, work: F) -> Result<JobId>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let kind = self.registry.default_kind().to_string();
        self.fire(kind, Box::pin(work), CancellationToken::new())
    }

    /// Like `submit`, but hands the work a token that fires when the job is
    /// cancelled.
    pub fn submit_with<F, Fut>(&self, kind: impl Into<String>, work: F) -> Result<JobId>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        // A child token: the work can observe cancellation but not trigger it.
        let routine: Routine = Box::pin(work(token.child_token()));
        self.fire(kind.into(), routine, token)
    }

    pub fn submit_job<J: Job>(&self, job: J) -> Result<JobId> {
        let kind = job.kind();
        self.submit_with(kind, move |cancel| Box::new(job).run(cancel))
    }

    fn fire(&self, kind: String, routine: Routine, token: CancellationToken) -> Result<JobId> {
        let id = self.registry.generate_id()?;
        let handle = TaskHandle::new(token.clone());

        // Tracked before anything is spawned, so completion always finds the entry.
        self.registry
            .track_as(id, kind, Arc::new(handle.clone()))?;

        let registry = self.registry.clone();
        self.runtime.spawn(async move {
            let mut work = tokio::spawn(routine);

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    work.abort();
                    None
                }
                joined = &mut work => Some(joined),
            };
            match outcome {
                // Whoever disposed the handle already removed the entry.
                None => tracing::debug!(job_id = %id, "Job stopped after cancellation"),
                Some(Ok(Ok(()))) => registry.complete(&id),
                Some(Ok(Err(e))) => registry.fail_and_remove(&id, format!("{:#}", e)),
                Some(Err(e)) if e.is_panic() => registry.fail_and_remove(&id, "job panicked"),
                Some(Err(e)) => registry.fail_and_remove(&id, e),
            }
            handle.mark_finished();
        });

        Ok(id)
    }
}
