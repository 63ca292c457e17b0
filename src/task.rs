//! Per-task runtime context (§3, §4.7), grounded on `execTransaction`'s
//! per-task buffer allocation (lines 3152 onward).
//!
//! Every buffer size below is taken directly from the original's fixed
//! allocations rather than invented, since an artifact compiled against
//! one set of sizes would behave differently against another.

use crate::abend::{Abend, AbendOutcome, ConditionHandlers, FaultSimulator};
use crate::eib::Eib;
use crate::memory::MemoryPool;
use std::collections::HashMap;

pub const LINK_AREA_LEN: usize = 16_000_000;
pub const COMM_AREA_LEN: usize = 32_768;
pub const TWA_LEN: usize = 32_768;
pub const TUA_LEN: usize = 256;
pub const LINK_STACK_CAPACITY: usize = 100;
pub const CALL_STACK_CAPACITY: usize = 1024;
pub const CHANNEL_BUFFER_CAPACITY: usize = 256;
/// Task-local `GETMAIN` pool capacity; unrelated to the buffers above,
/// which are fixed-purpose scratch areas rather than general-purpose
/// allocations.
const TASK_MEMORY_POOL_CAPACITY: usize = 256;

/// One frame of the `LINK`/`XCTL` call chain (§4.6).
pub struct LinkFrame {
    pub program: String,
    pub comm_area_len: usize,
}

/// Everything one task carries from start to end.
pub struct TaskContext {
    pub task_id: u32,
    pub eib: Eib,

    /// The commarea exchanged with the client at task start and
    /// optionally returned at `RETURN` (§4.6 `RETURN`/`SEND`).
    pub comm_area: Box<[u8; COMM_AREA_LEN]>,
    pub comm_area_len: usize,

    /// Scratch area handed to `LINK`ed programs, distinct from the
    /// commarea; sized to accommodate the largest realistic linkage
    /// section rather than grown dynamically, matching the original.
    pub link_area: Box<[u8]>,

    /// Transaction work area — persists across `LINK` calls within one
    /// task but not across tasks.
    pub twa: Box<[u8; TWA_LEN]>,
    /// Terminal user area — persists across tasks for the same terminal;
    /// owned by the session layer and handed in per task.
    pub tua: Box<[u8; TUA_LEN]>,

    pub link_stack: Vec<LinkFrame>,
    pub call_stack: Vec<String>,

    pub channel_buffers: HashMap<String, Vec<u8>>,

    pub memory: MemoryPool,
    pub conditions: ConditionHandlers,
    pub fault: FaultSimulator,

    pub transaction_id: String,
    pub terminal_id: String,
}

impl TaskContext {
    pub fn new(task_id: u32, transaction_id: impl Into<String>, terminal_id: impl Into<String>) -> Self {
        TaskContext {
            task_id,
            eib: Eib::new(),
            comm_area: Box::new([0u8; COMM_AREA_LEN]),
            comm_area_len: 0,
            link_area: vec![0u8; LINK_AREA_LEN].into_boxed_slice(),
            twa: Box::new([0u8; TWA_LEN]),
            tua: Box::new([0u8; TUA_LEN]),
            link_stack: Vec::new(),
            call_stack: Vec::new(),
            channel_buffers: HashMap::new(),
            memory: MemoryPool::new(TASK_MEMORY_POOL_CAPACITY),
            conditions: ConditionHandlers::default(),
            fault: FaultSimulator::new(),
            transaction_id: transaction_id.into(),
            terminal_id: terminal_id.into(),
        }
    }

    /// Pushes a `LINK` frame. Fails the way the original's fixed
    /// `linkStack[900]` does when the nesting goes too deep.
    pub fn push_link(&mut self, program: &str, comm_area_len: usize) -> crate::error::Result<()> {
        if self.link_stack.len() >= LINK_STACK_CAPACITY {
            return Err(crate::error::Error::CapacityExceeded("link stack"));
        }
        self.link_stack.push(LinkFrame { program: program.to_string(), comm_area_len });
        Ok(())
    }

    pub fn pop_link(&mut self) -> Option<LinkFrame> {
        self.link_stack.pop()
    }

    pub fn push_call(&mut self, program: &str) -> crate::error::Result<()> {
        if self.call_stack.len() >= CALL_STACK_CAPACITY {
            return Err(crate::error::Error::CapacityExceeded("call stack"));
        }
        self.call_stack.push(program.to_string());
        Ok(())
    }

    pub fn pop_call(&mut self) -> Option<String> {
        self.call_stack.pop()
    }

    pub fn put_channel(&mut self, name: &str, bytes: Vec<u8>) -> crate::error::Result<()> {
        if !self.channel_buffers.contains_key(name) && self.channel_buffers.len() >= CHANNEL_BUFFER_CAPACITY {
            return Err(crate::error::Error::CapacityExceeded("channel buffers"));
        }
        self.channel_buffers.insert(name.to_string(), bytes);
        Ok(())
    }

    pub fn get_channel(&self, name: &str) -> Option<&[u8]> {
        self.channel_buffers.get(name).map(|v| v.as_slice())
    }

    /// Resolves an abend against this task's handler table; `Unhandled`
    /// means the caller should unwind the task and report `abend.code`
    /// to the client as the terminal status (§6).
    pub fn resolve_abend<'a>(&'a self, abend: &Abend) -> AbendOutcome<'a> {
        self.conditions.resolve(abend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_empty_stacks_and_zeroed_areas() {
        let task = TaskContext::new(1, "TXN1", "T001");
        assert_eq!(task.comm_area_len, 0);
        assert!(task.link_stack.is_empty());
        assert!(task.call_stack.is_empty());
        assert_eq!(task.comm_area.len(), COMM_AREA_LEN);
        assert_eq!(task.link_area.len(), LINK_AREA_LEN);
    }

    #[test]
    fn link_stack_rejects_past_capacity() {
        let mut task = TaskContext::new(1, "TXN1", "T001");
        for i in 0..LINK_STACK_CAPACITY {
            task.push_link(&format!("P{i}"), 0).unwrap();
        }
        assert!(task.push_link("OVERFLOW", 0).is_err());
    }

    #[test]
    fn channel_buffer_round_trips() {
        let mut task = TaskContext::new(1, "TXN1", "T001");
        task.put_channel("CHAN1", vec![1, 2, 3]).unwrap();
        assert_eq!(task.get_channel("CHAN1"), Some(&[1u8, 2, 3][..]));
    }
}
