//! Named-resource locking: `ENQ`/`DEQ` (§4.3).
//!
//! Resources are identified by name. A task that holds the lock may
//! re-enter `ENQ` on the same name without blocking (reentrant per task);
//! any other task blocks until released, unless it asked not to
//! (`NOSUSPEND`), in which case it gets resp 55 immediately. Release is
//! FIFO among waiters by virtue of the condvar broadcast waking every
//! waiter, who then race to re-check the map — the first to observe the
//! name free wins, the rest go back to waiting.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

/// The scope a held lock is released under (§4.3, §4.6 `DEQ`/`SYNCPOINT`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Released explicitly via `DEQ`, or implicitly at task end.
    Task,
    /// Released at `SYNCPOINT`/`SYNCPOINT ROLLBACK`.
    UnitOfWork,
}

struct Holder {
    task_id: u32,
    scope: Scope,
}

struct Table {
    held: HashMap<String, Holder>,
}

/// The monitor-wide enqueue manager.
pub struct EnqueueManager {
    table: Mutex<Table>,
    released: Condvar,
}

impl EnqueueManager {
    pub fn new() -> Self {
        EnqueueManager { table: Mutex::new(Table { held: HashMap::new() }), released: Condvar::new() }
    }

    /// Acquires `name` for `task_id`. Blocks while held by another task
    /// unless `nosuspend` is set, in which case an unavailable resource
    /// returns [`Error::EnqueueWouldBlock`] (resp 55) immediately.
    /// Re-entrant: a task already holding `name` succeeds without
    /// blocking, and the lock's scope is widened to `scope` if it is now
    /// held for a longer-lived reason.
    pub fn enqueue(&self, name: &str, task_id: u32, scope: Scope, nosuspend: bool) -> Result<()> {
        let mut table = self.table.lock().expect("enqueue table mutex poisoned");
        loop {
            match table.held.get_mut(name) {
                Some(holder) if holder.task_id == task_id => {
                    if scope == Scope::Task {
                        holder.scope = Scope::Task;
                    }
                    return Ok(());
                }
                Some(_) => {
                    if nosuspend {
                        return Err(Error::EnqueueWouldBlock);
                    }
                    table = self.released.wait(table).expect("enqueue table mutex poisoned");
                }
                None => {
                    table.held.insert(name.to_string(), Holder { task_id, scope });
                    return Ok(());
                }
            }
        }
    }

    /// Releases `name` if held by `task_id`. A `DEQ` for a name the task
    /// does not hold is a silent no-op, matching the original's behavior
    /// of deleting an entry by key regardless of lock ownership history.
    pub fn dequeue(&self, name: &str, task_id: u32) {
        let mut table = self.table.lock().expect("enqueue table mutex poisoned");
        if matches!(table.held.get(name), Some(h) if h.task_id == task_id) {
            table.held.remove(name);
            self.released.notify_all();
        }
    }

    /// Releases every lock `task_id` holds at or below `scope` — `Task`
    /// releases everything (task end); `UnitOfWork` releases only locks
    /// taken with `Scope::UnitOfWork` (`SYNCPOINT`), leaving `Scope::Task`
    /// locks held across the syncpoint.
    pub fn release_all(&self, task_id: u32, scope: Scope) {
        let mut table = self.table.lock().expect("enqueue table mutex poisoned");
        let doomed: Vec<String> = table
            .held
            .iter()
            .filter(|(_, h)| h.task_id == task_id && (scope == Scope::Task || h.scope == Scope::UnitOfWork))
            .map(|(name, _)| name.clone())
            .collect();
        if doomed.is_empty() {
            return;
        }
        for name in doomed {
            table.held.remove(&name);
        }
        self.released.notify_all();
    }
}

impl Default for EnqueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn reentrant_enqueue_by_same_task_does_not_block() {
        let mgr = EnqueueManager::new();
        mgr.enqueue("RES1", 1, Scope::Task, false).unwrap();
        mgr.enqueue("RES1", 1, Scope::Task, false).unwrap();
    }

    #[test]
    fn nosuspend_conflict_returns_resp_55() {
        let mgr = EnqueueManager::new();
        mgr.enqueue("RES1", 1, Scope::Task, false).unwrap();
        let err = mgr.enqueue("RES1", 2, Scope::Task, true).unwrap_err();
        assert!(matches!(err, Error::EnqueueWouldBlock));
    }

    #[test]
    fn dequeue_wakes_a_blocked_waiter() {
        let mgr = Arc::new(EnqueueManager::new());
        mgr.enqueue("RES1", 1, Scope::Task, false).unwrap();

        let waiter = {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || mgr.enqueue("RES1", 2, Scope::Task, false))
        };

        thread::sleep(Duration::from_millis(20));
        mgr.dequeue("RES1", 1);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn release_all_unit_of_work_leaves_task_scoped_locks_held() {
        let mgr = EnqueueManager::new();
        mgr.enqueue("PERM", 1, Scope::Task, false).unwrap();
        mgr.enqueue("TEMP", 1, Scope::UnitOfWork, false).unwrap();
        mgr.release_all(1, Scope::UnitOfWork);
        assert!(mgr.enqueue("TEMP", 2, Scope::Task, true).is_ok());
        assert!(matches!(mgr.enqueue("PERM", 2, Scope::Task, true), Err(Error::EnqueueWouldBlock)));
    }
}
