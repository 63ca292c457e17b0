//! `tpcore` — the core transaction execution engine of a mainframe-style
//! transaction-processing monitor: per-task program artifact loading and
//! invocation, the embedded-command interpreter, typed field marshaling,
//! memory pools, named-resource locking, module serialization, the SQL
//! bridge, and structured abend/condition-handler dispatch.
//!
//! The TCP accept loop, protocol framing above the line level, the
//! relational driver's internals, the program-artifact compiler, and
//! client-side screen rendering are all out of scope — this crate is the
//! engine a session driver (see [`session`]) invokes once per client
//! request.

pub mod abend;
pub mod config;
pub mod eib;
pub mod enqueue;
pub mod error;
pub mod field;
pub mod interpreter;
pub mod loader;
pub mod memory;
pub mod monitor;
pub mod pool;
pub mod protocol;
pub mod serializer;
pub mod session;
pub mod sql;
pub mod task;

pub use error::{Error, Result};
