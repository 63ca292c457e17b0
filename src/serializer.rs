//! Module serializer: at most one concurrent execution per artifact name
//! (§4.1).
//!
//! `startModule`/`endModule` in the original bound this to a fixed
//! 500-entry name table; once full, a *new* name is allowed to run
//! unserialized rather than rejected outright — the original logs the
//! condition and proceeds. We preserve that behavior rather than turning
//! it into a hard failure, since changing it would change which programs
//! are allowed to run at all (§9 open question, recorded in DESIGN.md).

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use tracing::warn;

const NAME_TABLE_CAPACITY: usize = 500;

struct Table {
    running: HashMap<String, ()>,
    known_names: std::collections::HashSet<String>,
}

/// Serializes concurrent entry into artifacts by name.
pub struct ModuleSerializer {
    table: Mutex<Table>,
    left: Condvar,
}

impl ModuleSerializer {
    pub fn new() -> Self {
        ModuleSerializer {
            table: Mutex::new(Table { running: HashMap::new(), known_names: std::collections::HashSet::new() }),
            left: Condvar::new(),
        }
    }

    /// Blocks until `name` is not currently running, then marks it
    /// running. If the name table is already at capacity and `name` is
    /// new to it, the name is let through unserialized — a logged, not
    /// fatal, degradation.
    pub fn enter(&self, name: &str) {
        let mut table = self.table.lock().expect("serializer table mutex poisoned");

        if !table.known_names.contains(name) {
            if table.known_names.len() >= NAME_TABLE_CAPACITY {
                warn!(artifact = name, "module serializer name table full; running unserialized");
                return;
            }
            table.known_names.insert(name.to_string());
        }

        while table.running.contains_key(name) {
            table = self.left.wait(table).expect("serializer table mutex poisoned");
        }
        table.running.insert(name.to_string(), ());
    }

    /// Marks `name` as no longer running and wakes every waiter so they
    /// can re-check whether their name is now free.
    pub fn leave(&self, name: &str) {
        let mut table = self.table.lock().expect("serializer table mutex poisoned");
        table.running.remove(name);
        self.left.notify_all();
    }
}

impl Default for ModuleSerializer {
    fn default() -> Self {
        Self::new()
    }
}
