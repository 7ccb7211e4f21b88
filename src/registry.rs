use std::{collections::HashSet, fmt::Display, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    config::RegistryConfig,
    error::{RegistryError, Result},
    event::JobEvent,
    handle::CancellationHandle,
    id::JobId,
};

pub struct JobEntry {
    pub kind: String,
    pub handle: Arc<dyn CancellationHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub kind: String,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelResult {
    Cancelled,
    AlreadyFinished,
    NotFound,
}

/// Bookkeeping of running jobs.
///
/// Removal from the map is the only decision point between natural completion
/// and cancellation: whichever call removes the entry runs its side effects,
/// every other call for that id finds nothing and does nothing.
pub struct JobRegistry {
    jobs: DashMap<JobId, JobEntry>,
    events: broadcast::Sender<JobEvent>,
    default_kind: String,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_config(&RegistryConfig::default())
    }

    pub fn with_config(config: &RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        JobRegistry {
            jobs: DashMap::new(),
            events,
            default_kind: config.default_kind.clone(),
        }
    }

    pub fn default_kind(&self) -> &str {
        &self.default_kind
    }

    /// Receives every lifecycle event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn generate_id(&self) -> Result<JobId> {
        JobId::generate()
    }

    pub fn track(&self, id: JobId, handle: Arc<dyn CancellationHandle>) -> Result<()> {
        let kind = self.default_kind.clone();
        self.track_as(id, kind, handle)
    }

    pub fn track_as(
        &self,
        id: JobId,
        kind: impl Into<String>,
        handle: Arc<dyn CancellationHandle>,
    ) -> Result<()> {
        let kind = kind.into();
        match self.jobs.entry(id) {
            Entry::Occupied(_) => {
                tracing::error!(job_id = %id, "Job is already tracked");
                return Err(RegistryError::InvalidState(id));
            }
            Entry::Vacant(slot) => {
                // Emitted under the shard lock: a racing remove waits for it, so
                // `Started` always precedes the job's terminal event.
                let _entry = slot.insert(JobEntry {
                    kind: kind.clone(),
                    handle,
                });
                self.emit(JobEvent::Started { id, kind });
            }
        }

        Ok(())
    }

    /// Natural completion. No-op when the entry is already gone.
    pub fn complete(&self, id: &JobId) {
        if self.jobs.remove(id).is_some() {
            self.emit(JobEvent::Completed { id: *id });
        } else {
            tracing::debug!(job_id = %id, "Completed job was no longer tracked");
        }
    }

    pub fn fail_and_remove(&self, id: &JobId, error: impl Display) {
        if let Some((_, entry)) = self.jobs.remove(id) {
            if !entry.handle.is_disposed() {
                entry.handle.dispose();
            }
            self.emit(JobEvent::Failed {
                id: *id,
                error: error.to_string(),
            });
        } else {
            tracing::debug!(job_id = %id, error = %error, "Failed job was no longer tracked");
        }
    }

    pub fn cancel(&self, id: &JobId) -> CancelResult {
        match self.jobs.remove(id) {
            Some((_, entry)) if !entry.handle.is_disposed() => {
                entry.handle.dispose();
                self.emit(JobEvent::Cancelled { id: *id });
                CancelResult::Cancelled
            }
            Some(_) => {
                tracing::debug!(job_id = %id, "Cancelled job had already finished");
                self.emit(JobEvent::Completed { id: *id });
                CancelResult::AlreadyFinished
            }
            None => {
                self.emit(JobEvent::NotFoundOnCancel { id: *id });
                CancelResult::NotFound
            }
        }
    }

    /// Drains every tracked job, returning how many handles were disposed.
    pub fn cancel_all(&self) -> usize {
        let ids = self.jobs.iter().map(|e| *e.key()).collect::<Vec<_>>();
        let mut cancelled = 0;

        for id in ids {
            if let Some((_, entry)) = self.jobs.remove(&id) {
                if !entry.handle.is_disposed() {
                    entry.handle.dispose();
                    self.emit(JobEvent::Cancelled { id });
                    cancelled += 1;
                }
            }
        }

        tracing::info!(cancelled, "Cancelled all jobs");
        cancelled
    }

    /// Advisory: the job may finish right after this returns.
    pub fn is_running(&self, id: &JobId) -> bool {
        self.jobs
            .get(id)
            .map(|entry| !entry.handle.is_disposed())
            .unwrap_or(false)
    }

    pub fn list_ids(&self) -> HashSet<JobId> {
        self.jobs.iter().map(|e| *e.key()).collect()
    }

    pub fn list_all(&self) -> Vec<JobDescriptor> {
        let mut all = self
            .jobs
            .iter()
            .map(|e| JobDescriptor {
                id: *e.key(),
                kind: e.kind.clone(),
                running: !e.handle.is_disposed(),
            })
            .collect::<Vec<_>>();
        all.sort_by(|a, b| a.kind.cmp(&b.kind).then(a.id.cmp(&b.id)));
        all
    }

    pub fn count(&self) -> usize {
        self.jobs.len()
    }

    fn emit(&self, event: JobEvent) {
        event.log();
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod registry_tests {
    use std::sync::Arc;

    use tokio::sync::broadcast::Receiver;

    use super::{CancelResult, JobRegistry};
    use crate::{
        config::RegistryConfig,
        error::RegistryError,
        event::JobEvent,
        handle::{test_support::RecordingHandle, CancellationHandle},
        id::JobId,
    };

    fn drain(rx: &mut Receiver<JobEvent>) -> Vec<JobEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn tracked(reg: &JobRegistry) -> (JobId, Arc<RecordingHandle>) {
        let id = reg.generate_id().unwrap();
        let handle = Arc::new(RecordingHandle::default());
        reg.track(id, handle.clone()).unwrap();
        (id, handle)
    }

    #[test]
    fn track_test() {
        let reg = JobRegistry::new();
        let mut rx = reg.subscribe();
        let (id, _) = tracked(&reg);

        assert_eq!(reg.count(), 1);
        assert!(reg.list_ids().contains(&id));
        assert!(reg.is_running(&id));
        assert_eq!(
            drain(&mut rx),
            vec![JobEvent::Started {
                id,
                kind: "job".to_string()
            }]
        );
    }

    #[test]
    fn track_twice_test() {
        let reg = JobRegistry::new();
        let (id, first) = tracked(&reg);

        let again = reg.track(id, Arc::new(RecordingHandle::default()));
        assert!(matches!(again, Err(RegistryError::InvalidState(dup)) if dup == id));

        assert_eq!(reg.count(), 1);
        assert_eq!(reg.cancel(&id), CancelResult::Cancelled);
        assert_eq!(first.calls(), 1);
    }

    #[test]
    fn complete_test() {
        let reg = JobRegistry::new();
        let (id, handle) = tracked(&reg);
        let mut rx = reg.subscribe();

        reg.complete(&id);
        assert_eq!(reg.count(), 0);
        assert!(!reg.is_running(&id));
        assert_eq!(handle.calls(), 0);
        assert_eq!(drain(&mut rx), vec![JobEvent::Completed { id }]);

        reg.complete(&id);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn fail_and_remove_test() {
        let reg = JobRegistry::new();
        let (id, handle) = tracked(&reg);
        let mut rx = reg.subscribe();

        reg.fail_and_remove(&id, "boom");
        assert_eq!(reg.count(), 0);
        assert_eq!(handle.calls(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![JobEvent::Failed {
                id,
                error: "boom".to_string()
            }]
        );

        reg.fail_and_remove(&id, "boom");
        assert_eq!(handle.calls(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn fail_skips_disposed_handle_test() {
        let reg = JobRegistry::new();
        let id = reg.generate_id().unwrap();
        let handle = Arc::new(RecordingHandle::disposed());
        reg.track(id, handle.clone()).unwrap();

        reg.fail_and_remove(&id, "late");
        assert_eq!(handle.calls(), 0);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn cancel_test() {
        let reg = JobRegistry::new();
        let (id, handle) = tracked(&reg);
        let mut rx = reg.subscribe();

        assert_eq!(reg.cancel(&id), CancelResult::Cancelled);
        assert!(handle.is_disposed());
        assert!(!reg.list_ids().contains(&id));
        assert_eq!(drain(&mut rx), vec![JobEvent::Cancelled { id }]);
    }

    #[test]
    fn cancel_unknown_test() {
        let reg = JobRegistry::new();
        let (other, _) = tracked(&reg);
        let mut rx = reg.subscribe();
        let unknown = reg.generate_id().unwrap();

        assert_eq!(reg.cancel(&unknown), CancelResult::NotFound);
        assert_eq!(reg.list_ids().into_iter().collect::<Vec<_>>(), vec![other]);
        assert_eq!(drain(&mut rx), vec![JobEvent::NotFoundOnCancel { id: unknown }]);
    }

    #[test]
    fn cancel_already_finished_test() {
        let reg = JobRegistry::new();
        let id = reg.generate_id().unwrap();
        let handle = Arc::new(RecordingHandle::disposed());
        reg.track(id, handle.clone()).unwrap();
        let mut rx = reg.subscribe();

        assert!(!reg.is_running(&id));
        assert_eq!(reg.cancel(&id), CancelResult::AlreadyFinished);
        assert_eq!(handle.calls(), 0);
        assert_eq!(reg.count(), 0);
        assert_eq!(drain(&mut rx), vec![JobEvent::Completed { id }]);
    }

    #[test]
    fn cancel_before_track_test() {
        let reg = JobRegistry::new();
        let id = reg.generate_id().unwrap();

        assert_eq!(reg.cancel(&id), CancelResult::NotFound);

        let handle = Arc::new(RecordingHandle::default());
        reg.track(id, handle.clone()).unwrap();
        assert!(reg.is_running(&id));
        assert_eq!(handle.calls(), 0);

        reg.complete(&id);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn cancel_all_test() {
        let reg = JobRegistry::new();
        let live = (0..5).map(|_| tracked(&reg).1).collect::<Vec<_>>();
        let finished = Arc::new(RecordingHandle::disposed());
        reg.track(reg.generate_id().unwrap(), finished.clone())
            .unwrap();

        assert_eq!(reg.cancel_all(), 5);
        assert!(reg.list_ids().is_empty());
        assert!(live.iter().all(|h| h.is_disposed() && h.calls() == 1));
        assert_eq!(finished.calls(), 0);
        assert_eq!(reg.cancel_all(), 0);
    }

    #[test]
    fn list_all_test() {
        let reg = JobRegistry::with_config(&RegistryConfig {
            default_kind: "TEST".to_string(),
            ..RegistryConfig::default()
        });
        let (plain, _) = tracked(&reg);
        let named = reg.generate_id().unwrap();
        reg.track_as(named, "ALPHA", Arc::new(RecordingHandle::disposed()))
            .unwrap();

        let list = reg.list_all();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, named);
        assert_eq!(list[0].kind, "ALPHA");
        assert!(!list[0].running);
        assert_eq!(list[1].id, plain);
        assert_eq!(list[1].kind, "TEST");
        assert!(list[1].running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_removal_under_contention_test() {
        let reg = Arc::new(JobRegistry::with_config(&RegistryConfig {
            event_capacity: 8192,
            ..RegistryConfig::default()
        }));
        let jobs = (0..200).map(|_| tracked(&reg)).collect::<Vec<_>>();
        let mut rx = reg.subscribe();

        let mut tasks = vec![];
        for (id, _) in &jobs {
            for n in 0..3 {
                let reg = reg.clone();
                let id = *id;
                tasks.push(tokio::spawn(async move {
                    match n {
                        0 => reg.complete(&id),
                        1 => reg.fail_and_remove(&id, "racing"),
                        _ => {
                            reg.cancel(&id);
                        }
                    }
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(reg.count(), 0);
        let events = drain(&mut rx);
        for (id, handle) in &jobs {
            let terminal = events
                .iter()
                .filter(|e| {
                    e.id() == *id
                        && matches!(
                            e,
                            JobEvent::Completed { .. }
                                | JobEvent::Failed { .. }
                                | JobEvent::Cancelled { .. }
                        )
                })
                .count();
            assert_eq!(terminal, 1, "job {} resolved {} times", id, terminal);
            assert!(handle.calls() <= 1);
        }
    }

    #[test]
    fn started_precedes_racing_cancel_test() {
        for _ in 0..2000 {
            let reg = JobRegistry::new();
            let mut rx = reg.subscribe();
            let id = reg.generate_id().unwrap();

            std::thread::scope(|s| {
                s.spawn(|| {
                    while !reg.is_running(&id) {
                        std::hint::spin_loop();
                    }
                    assert_eq!(reg.cancel(&id), CancelResult::Cancelled);
                });
                reg.track(id, Arc::new(RecordingHandle::default())).unwrap();
            });

            assert_eq!(
                drain(&mut rx),
                vec![
                    JobEvent::Started {
                        id,
                        kind: "job".to_string()
                    },
                    JobEvent::Cancelled { id },
                ]
            );
        }
    }

    #[test]
    fn cancel_all_during_submissions_test() {
        let reg = JobRegistry::with_config(&RegistryConfig {
            event_capacity: 8192,
            ..RegistryConfig::default()
        });
        let mut rx = reg.subscribe();
        let barrier = std::sync::Barrier::new(2);

        let (jobs, drained_by_sweeps) = std::thread::scope(|s| {
            let submitter = s.spawn(|| {
                barrier.wait();
                (0..500).map(|_| tracked(&reg)).collect::<Vec<_>>()
            });

            barrier.wait();
            let mut drained = 0;
            for _ in 0..5 {
                drained += reg.cancel_all();
                std::thread::yield_now();
            }
            (submitter.join().unwrap(), drained)
        });

        let events = drain(&mut rx);
        let remaining = reg.list_ids();
        let mut drained = 0;
        for (id, handle) in &jobs {
            let cancelled = events
                .iter()
                .filter(|e| **e == JobEvent::Cancelled { id: *id })
                .count();
            if remaining.contains(id) {
                assert!(reg.is_running(id));
                assert_eq!(handle.calls(), 0);
                assert_eq!(cancelled, 0);
            } else {
                assert!(handle.is_disposed());
                assert_eq!(handle.calls(), 1);
                assert_eq!(cancelled, 1, "job {} cancelled {} times", id, cancelled);
                drained += 1;
            }
        }
        assert_eq!(drained, drained_by_sweeps);
        assert_eq!(remaining.len() + drained, jobs.len());

        assert_eq!(reg.cancel_all(), remaining.len());
        assert!(reg.list_ids().is_empty());
    }
}
