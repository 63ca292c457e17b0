//! Monitor-wide shared state: the subsystems every task's [`Interpreter`]
//! borrows from (§2, §5 "Shared-resource policy"), grounded on the
//! original's `initExec`/`clearExec` and the process-wide globals they
//! set up once (`sharedAllocMem`, `cwa`, the module mutex, the enqueue
//! table, the connection pool).
//!
//! [`Interpreter`]: crate::interpreter::Interpreter

use crate::config::MonitorConfig;
use crate::enqueue::EnqueueManager;
use crate::error::Result;
use crate::loader::ArtifactLoader;
use crate::memory::SharedArena;
use crate::pool::ConnectionPool;
use crate::serializer::ModuleSerializer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared-arena capacity, in slots, for the monitor's general-purpose
/// `GETMAIN SHARED` pool. Distinct from the fixed 4096-byte CWA block.
const SHARED_MEMORY_POOL_CAPACITY: usize = 1024;

/// Size of the common work area (§10.6 `CWA`), fixed by the original's
/// `cwa = sharedMalloc(13, 4096)`.
pub const CWA_LEN: usize = 4096;

/// Everything a session needs that outlives any one task.
pub struct Monitor {
    pub config: MonitorConfig,
    pub loader: ArtifactLoader,
    pub serializer: ModuleSerializer,
    pub enqueue: EnqueueManager,
    pub shared_arena: SharedArena,
    pub pool: Option<Arc<dyn ConnectionPool>>,
    cwa: Box<[u8; CWA_LEN]>,
    next_task_id: AtomicU32,
}

impl Monitor {
    /// Builds the monitor from `config`, optionally wiring up a database
    /// connection pool (absent in tests that never issue `EXEC SQL`).
    pub fn new(config: MonitorConfig, pool: Option<Arc<dyn ConnectionPool>>) -> Result<Self> {
        let loader = ArtifactLoader::new(config.load_module_dir.clone());
        Ok(Monitor {
            config,
            loader,
            serializer: ModuleSerializer::new(),
            enqueue: EnqueueManager::new(),
            shared_arena: SharedArena::new(SHARED_MEMORY_POOL_CAPACITY),
            pool,
            cwa: Box::new([0u8; CWA_LEN]),
            next_task_id: AtomicU32::new(1),
        })
    }

    /// Raw pointer to the common work area, handed out by `ADDRESS
    /// SET(...) COMMON-WORK-AREA` (§4.6, §10.6). Valid for the life of
    /// the monitor process.
    pub fn cwa_ptr(&self) -> *mut u8 {
        self.cwa.as_ptr() as *mut u8
    }

    /// Assigns the next monotonically increasing task id (EIB offset 12,
    /// §3).
    pub fn next_task_id(&self) -> u32 {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_monotonically_increasing() {
        let monitor = Monitor::new(MonitorConfig::default(), None).unwrap();
        let a = monitor.next_task_id();
        let b = monitor.next_task_id();
        assert!(b > a);
    }

    #[test]
    fn cwa_pointer_is_stable_across_calls() {
        let monitor = Monitor::new(MonitorConfig::default(), None).unwrap();
        assert_eq!(monitor.cwa_ptr(), monitor.cwa_ptr());
    }
}
