//! Token-class vocabulary the command interpreter reasons about (§4.6).
//!
//! The artifact ABI itself — the exact callback signature an artifact
//! uses to stream verb/keyword/field tokens into the monitor — is
//! explicitly out of scope (§1: "does not standardise the exact wire
//! text of every command"). What the design does pin down is the verb
//! set, the per-verb parameter shape, and the commit semantics once a
//! command is fully assembled; [`super::Command`] is the idiomatic Rust
//! realization of "one fully assembled command", built by whatever sits
//! between a compiled artifact and this interpreter. This module keeps
//! the verb tags and task-local sub-states named the way §4.6 names
//! them, for anyone cross-referencing the two.

/// The verb currently being assembled (`cmdState`'s negative tag range,
/// §4.6). `Idle` is `cmdState == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerbTag {
    Idle,
    Send,
    Receive,
    Xctl,
    Link,
    Retrieve,
    Getmain,
    Freemain,
    Address,
    Put,
    Get,
    Enq,
    Deq,
    Syncpoint,
    WriteQ,
    ReadQ,
    DeleteQ,
    Abend,
    AskTime,
    Inquire,
    Assign,
    FormatTime,
    Start,
    Cancel,
    Return,
}

/// Target of the next storage-materialization token (`areaMode`, §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AreaMode {
    Linkage,
    Commarea,
}

/// What `ADDRESS SET` points the caller's pointer field at (§4.6
/// `ADDRESS`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressTarget {
    CommonWorkArea,
    TaskWorkArea,
    TaskUserArea,
    CommArea,
    Eib,
}

/// One read-only query destination for `ASSIGN`/`INQUIRE` (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignQuery {
    ApplId,
    UserId,
    SysId,
    Tranid,
    StartCode,
}
