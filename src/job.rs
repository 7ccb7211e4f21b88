use std::{future::Future, pin::Pin};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub type Routine = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// A unit of work that can be handed to `JobRunner::submit_job`.
///
/// `run` receives the job's cancellation token. Checking it lets the job stop
/// early and clean up; jobs that ignore it are still dropped at their next
/// await point once cancelled.
#[async_trait]
pub trait Job: Send + 'static {
    fn kind(&self) -> String;

    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<()>;
}

/// Sleeps for `duration` unless cancelled first.
pub struct DelayJob {
    pub duration: std::time::Duration,
}

#[async_trait]
impl Job for DelayJob {
    fn kind(&self) -> String {
        "delay".to_string()
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<()> {
        tracing::debug!(secs = self.duration.as_secs_f64(), "Delay job sleeping");
        tokio::select! {
            _ = cancel.cancelled() => tracing::debug!("Delay job interrupted"),
            _ = tokio::time::sleep(self.duration) => tracing::debug!("Delay job woke up"),
        }
        Ok(())
    }
}
