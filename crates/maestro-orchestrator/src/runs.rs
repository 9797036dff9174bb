use crate::types::{Run, RunId, RunStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct RunEntry {
    cancel: CancellationToken,
    status: watch::Receiver<RunStatus>,
    finished: Option<Run>,
    discard_on_finish: bool,
}

/// Runs started by a coordinator, from start until their result is taken.
///
/// The lock is never held across an await point.
pub struct RunTable {
    entries: Mutex<HashMap<RunId, RunEntry>>,
}

impl RunTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: RunId, cancel: CancellationToken, status: watch::Receiver<RunStatus>) {
        self.entries.lock().insert(
            id,
            RunEntry {
                cancel,
                status,
                finished: None,
                discard_on_finish: false,
            },
        );
    }

    /// Request cancellation of a live run. Returns false if the run is
    /// unknown or already terminal.
    pub fn cancel(&self, id: RunId) -> bool {
        let entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) if !entry.status.borrow().is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, id: RunId) -> Option<RunStatus> {
        self.entries
            .lock()
            .get(&id)
            .map(|entry| entry.status.borrow().clone())
    }

    /// Store a finished run until someone takes it. Runs marked with
    /// [`RunTable::discard_on_finish`] are dropped instead.
    pub fn complete(&self, run: Run) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&run.id) else {
            return;
        };
        if entry.discard_on_finish {
            entries.remove(&run.id);
        } else {
            entry.finished = Some(run);
        }
    }

    /// Nobody will take this run: remove it now if finished, otherwise as
    /// soon as it completes.
    pub fn discard_on_finish(&self, id: RunId) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&id) {
            Some(entry) if entry.finished.is_none() => entry.discard_on_finish = true,
            Some(_) => {
                entries.remove(&id);
            }
            None => {}
        }
    }

    /// Remove and return a finished run. Live runs stay in the table.
    pub fn take(&self, id: RunId) -> Option<Run> {
        let mut entries = self.entries.lock();
        if entries.get(&id)?.finished.is_none() {
            return None;
        }
        entries.remove(&id).and_then(|entry| entry.finished)
    }

    pub fn remove(&self, id: RunId) {
        self.entries.lock().remove(&id);
    }

    /// Runs that have not reached a terminal status.
    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.status.borrow().is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for RunTable {
    fn default() -> Self {
        Self::new()
    }
}
