use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::StorageHandle;
use crate::item::StoreClient;
use crate::model::{TaskId, TaskPatch};

/// Outcome of one queued store request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Applied { id: TaskId, patch: TaskPatch },
    Removed { id: TaskId },
    Failed { id: TaskId, message: String },
}

impl DispatchEvent {
    pub fn id(&self) -> &TaskId {
        match self {
            DispatchEvent::Applied { id, .. }
            | DispatchEvent::Removed { id }
            | DispatchEvent::Failed { id, .. } => id,
        }
    }
}

enum Job {
    Edit(TaskId, TaskPatch),
    Remove(TaskId),
}

/// Applies edit and removal requests on a background thread, in the order
/// they were issued.
pub struct StoreWorker {
    jobs: Mutex<Option<Sender<Job>>>,
    events: Receiver<DispatchEvent>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StoreWorker {
    pub fn spawn(storage: StorageHandle) -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (event_tx, event_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("taskrow-store".into())
            .spawn(move || {
                for job in job_rx {
                    let event = run_job(&storage, job);
                    if event_tx.send(event).is_err() {
                        tracing::trace!("dispatch event receiver dropped");
                    }
                }
                tracing::debug!("store worker drained");
            })
            .map_err(|err| anyhow!("failed to spawn store worker thread: {err}"))?;
        Ok(Self {
            jobs: Mutex::new(Some(job_tx)),
            events: event_rx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn events(&self) -> &Receiver<DispatchEvent> {
        &self.events
    }

    /// Stops accepting requests, waits for queued ones to finish and joins
    /// the thread. Later calls are no-ops.
    pub fn shutdown(&self) {
        drop(self.jobs.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("store worker thread panicked");
            }
        }
    }

    fn submit(&self, id: &TaskId, job: Job) {
        let guard = self.jobs.lock();
        let Some(jobs) = guard.as_ref() else {
            tracing::warn!(task = %id, "store worker already shut down, request dropped");
            return;
        };
        if jobs.send(job).is_err() {
            tracing::error!(task = %id, "store worker stopped, request dropped");
        }
    }
}

impl StoreClient for StoreWorker {
    fn request_edit(&self, id: &TaskId, patch: TaskPatch) {
        self.submit(id, Job::Edit(id.clone(), patch));
    }

    fn request_remove(&self, id: &TaskId) {
        self.submit(id, Job::Remove(id.clone()));
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(storage: &StorageHandle, job: Job) -> DispatchEvent {
    match job {
        Job::Edit(id, patch) => match storage.apply_patch(&id, &patch) {
            Ok(()) => DispatchEvent::Applied { id, patch },
            Err(err) => failed(id, err),
        },
        Job::Remove(id) => match storage.remove_task(&id) {
            Ok(()) => DispatchEvent::Removed { id },
            Err(err) => failed(id, err),
        },
    }
}

fn failed(id: TaskId, err: anyhow::Error) -> DispatchEvent {
    tracing::error!(?err, task = %id, "store request failed");
    DispatchEvent::Failed {
        id,
        message: format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use time::macros::datetime;

    use super::*;
    use crate::item::{EditDispatcher, EditIntent};
    use crate::model::DateField;
    use crate::storage::tests::init_storage;

    #[test]
    fn requests_apply_in_order_and_report_events() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let task = storage.create_task("book flights", &BTreeSet::new())?;
        let worker = Arc::new(StoreWorker::spawn(storage.clone())?);
        let dispatcher = EditDispatcher::new(worker.clone());

        dispatcher.dispatch(&task.id, EditIntent::Content("book fl".into()));
        dispatcher.dispatch(&task.id, EditIntent::Content("book flights to Oslo".into()));
        dispatcher.dispatch(
            &task.id,
            EditIntent::Date(DateField::Due, Some(datetime!(2024-01-01 00:00 UTC))),
        );
        worker.shutdown();

        let events: Vec<_> = worker.events().try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|event| matches!(event, DispatchEvent::Applied { .. })));

        let stored = storage.fetch_task(&task.id)?.expect("task present");
        assert_eq!(stored.content, "book flights to Oslo");
        assert_eq!(stored.due, Some(datetime!(2024-01-01 00:00 UTC)));
        Ok(())
    }

    #[test]
    fn failures_become_events() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let worker = StoreWorker::spawn(storage)?;
        let ghost = TaskId::from("ghost");
        worker.request_remove(&ghost);
        worker.shutdown();

        let event = worker.events().try_recv()?;
        assert_eq!(event.id(), &ghost);
        assert_matches!(event, DispatchEvent::Failed { message, .. } if message.contains("not found"));
        Ok(())
    }

    #[test]
    fn requests_after_shutdown_are_dropped() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let task = storage.create_task("water plants", &BTreeSet::new())?;
        let worker = StoreWorker::spawn(storage.clone())?;
        worker.shutdown();
        worker.request_remove(&task.id);
        worker.shutdown();

        assert!(worker.events().try_recv().is_err());
        assert!(storage.fetch_task(&task.id)?.is_some());
        Ok(())
    }
}
