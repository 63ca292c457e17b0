//! The command interpreter (§4.6) — the dispatcher a running artifact
//! drives for every embedded command.
//!
//! The artifact-facing token stream itself (verb-open / parameter-keyword
//! / field-argument / RESP-RESP2 / NOHANDLE / END-EXEC, `cmdState`) is the
//! assembly protocol described in §4.6; [`tokens`] names those classes.
//! What this module implements is the result of that assembly: a
//! [`Command`] is one fully accumulated embedded command, and
//! [`Interpreter::run`] is what `END-EXEC` commits. Building a `Command`
//! token-by-token is the generated glue's job, not the interpreter's —
//! exactly as the artifact's own preprocessor, not this monitor, owns the
//! wire-level shape of any one verb (§1 non-goals).

pub mod tokens;
pub mod verbs;

pub use tokens::{AddressTarget, AreaMode, AssignQuery, VerbTag};

use crate::abend::{Abend, AbendOutcome, RunState};
use crate::enqueue::{EnqueueManager, Scope};
use crate::error::{Error, Resp, Result};
use crate::field::Field;
use crate::loader::{ArtifactLoader, CallCache};
use crate::memory::SharedArena;
use crate::pool::Connection;
use crate::protocol::ClientChannel;
use crate::serializer::ModuleSerializer;
use crate::task::TaskContext;
use std::io::{Read, Write};

/// One fully assembled embedded command, ready to commit at `END-EXEC`.
pub enum Command {
    Send { map: Option<String>, mapset: Option<String>, from: Option<Field> },
    Receive { into: Field, max_length: usize },
    Link { program: String, commarea: Option<Field>, params: Vec<Field> },
    Xctl { program: String, commarea: Option<Field>, params: Vec<Field> },
    Getmain { ptr_field: Field, length: usize, shared: bool, init_byte: Option<u8> },
    Freemain { ptr: *mut u8 },
    Address { target: AddressTarget, ptr_field: Field },
    Enq { resource: String, nosuspend: bool, scope: Scope },
    Deq { resource: String, scope: Scope },
    Syncpoint { rollback: bool },
    Return,
    Abend { code: Option<String> },
    AskTime { into: Field },
    FormatTime { into: Field },
    Assign { query: AssignQuery, into: Field },
    WriteQ { queue: String, from: Field, item_into: Option<Field> },
    ReadQ { queue: String, into: Field, item: Option<u32> },
    DeleteQ { queue: String },
    Start { transaction_id: String, from: Option<Field> },
    Cancel { req_id: String },
    Sql { text: String, params: Vec<String>, outputs: Vec<Field>, status_area: Option<Field> },
    Put { channel: String, from: Field },
    Get { channel: String, target: GetTarget },
    Inquire { into: Field },
}

/// Where `GET CHANNEL` deposits the retrieved bytes (§4.6 "PUT / GET").
pub enum GetTarget {
    /// `INTO(field)` — copy into a pre-existing, fixed-size field.
    Into(Field),
    /// `SET(ptr_field)` — allocate a channel buffer and bind the caller's
    /// pointer field to it.
    Set(Field),
}

/// A command plus the RESP/RESP2/NOHANDLE bindings collected alongside it
/// (§4.6 token classes 4 and 5).
pub struct CommandEnvelope {
    pub command: Command,
    pub resp_field: Option<Field>,
    pub resp2_field: Option<Field>,
    pub nohandle: bool,
}

impl CommandEnvelope {
    pub fn new(command: Command) -> Self {
        CommandEnvelope { command, resp_field: None, resp2_field: None, nohandle: false }
    }
}

/// What the driver does after one command commits.
pub enum Outcome {
    /// The artifact keeps running; `Resp` is what the EIB now holds.
    Continue(Resp),
    /// A condition handler was resolved; control transfers to the named
    /// label instead of unwinding (§4.7, S6).
    HandlerInvoked(String),
    /// `XCTL` ran its target to completion; the current artifact frame
    /// must not be resumed (§4.6 XCTL: "does not return").
    ProgramTransferred,
    /// `RETURN` committed; the outer dispatcher emits the terminal
    /// `STOP` line and ends the task.
    Ended(Resp),
}

/// Everything one embedded command needs to run: the task it belongs to,
/// the client channel it may talk to, and the monitor-wide subsystems.
pub struct Interpreter<'t, S> {
    pub task: &'t mut TaskContext,
    pub channel: &'t mut ClientChannel<S>,
    pub enqueue: &'t EnqueueManager,
    pub serializer: &'t ModuleSerializer,
    pub loader: &'t ArtifactLoader,
    pub call_cache: &'t mut CallCache,
    pub connection: Option<&'t mut dyn Connection>,
    pub copybook_dir: &'t str,
    /// The monitor-wide shared memory arena `GETMAIN SHARED` routes to (§4.2).
    pub shared_arena: &'t SharedArena,
    /// The 4096-byte common work area `ADDRESS SET(...) COMMON-WORK-AREA`
    /// points at (§4.6 `ADDRESS`, §10.6 `CWA`). Lives in the shared arena
    /// for the life of the monitor process, so a raw pointer into it
    /// outlives every task.
    pub cwa: *mut u8,
}

impl<'t, S: Read + Write> Interpreter<'t, S> {
    /// Commits one assembled command (§4.6 "End-of-command", §4.7
    /// `abend`).
    ///
    /// An explicit `ABEND` is unconditional (§4.6: "unconditional abend
    /// with the given code") — it carries its own four-character code
    /// straight to [`Interpreter::unwind`] rather than going through the
    /// resp-to-abcode mapping every other command's failure does, and it
    /// ignores any bound RESP field.
    pub fn run(&mut self, envelope: CommandEnvelope) -> Result<Outcome> {
        if let Command::Abend { code } = &envelope.command {
            let abend = Abend::from_code(code.clone().unwrap_or_else(|| "ASRA".to_string()));
            return self.unwind(abend);
        }

        let is_return = matches!(envelope.command, Command::Return);
        let is_xctl = matches!(envelope.command, Command::Xctl { .. });

        let dispatch_result = self.dispatch(envelope.command);

        // A client-channel I/O failure is fatal to the task regardless of
        // RESP/NOHANDLE bindings (§7 "Client-protocol").
        let resp = match dispatch_result {
            Ok(resp) => resp,
            Err(Error::Client(e)) => return Err(Error::Client(e)),
            Err(e) => e.resp(),
        };

        self.task.eib.set_resp(resp);
        if let Some(mut field) = envelope.resp_field {
            field.set_numeric_value(resp.resp as i64)?;
        }
        if let Some(mut field) = envelope.resp2_field {
            field.set_numeric_value(resp.resp2 as i64)?;
        }

        if is_return {
            return Ok(Outcome::Ended(resp));
        }

        let must_abend = resp.resp != 0 && envelope.resp_field.is_none() && !envelope.nohandle;
        if !must_abend {
            if is_xctl {
                return Ok(Outcome::ProgramTransferred);
            }
            return Ok(Outcome::Continue(resp));
        }

        self.unwind(Abend::from_resp(resp, false))
    }

    /// Resolves an abend against the task's handler table and either
    /// transfers control to a registered label or unwinds the task,
    /// emitting the terminal `ABEND`/`ABCODE` (and, if a fault was
    /// simulated, `STOP`) lines (§4.7).
    fn unwind(&mut self, abend: Abend) -> Result<Outcome> {
        self.task.eib.set_resp(abend.resp);
        match self.task.resolve_abend(&abend) {
            AbendOutcome::Handled(label) => Ok(Outcome::HandlerInvoked(label.to_string())),
            AbendOutcome::Unhandled => {
                self.channel.write_keyword("ABEND")?;
                self.channel.write_keyword("ABCODE")?;
                self.channel.write_literal(&abend.code)?;
                self.channel.write_blank_line()?;
                if self.task.fault.state() == RunState::Faulted {
                    self.channel.write_keyword("STOP")?;
                }
                Err(Error::TaskAbended(abend.code))
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<Resp> {
        match command {
            Command::Send { map, mapset, from } => self.do_send(map, mapset, from),
            Command::Receive { into, max_length } => self.do_receive(into, max_length),
            Command::Link { program, commarea, params } => self.do_link(&program, commarea, params),
            Command::Xctl { program, commarea, params } => self.do_xctl(&program, commarea, params),
            Command::Getmain { ptr_field, length, shared, init_byte } => self.do_getmain(ptr_field, length, shared, init_byte),
            Command::Freemain { ptr } => self.do_freemain(ptr),
            Command::Address { target, ptr_field } => self.do_address(target, ptr_field),
            Command::Enq { resource, nosuspend, scope } => self.do_enq(&resource, nosuspend, scope),
            Command::Deq { resource, scope } => self.do_deq(&resource, scope),
            Command::Syncpoint { rollback } => self.do_syncpoint(rollback),
            Command::Return => self.do_return(),
            // Unconditional; intercepted in `run` before dispatch is ever
            // reached, but the arm must stay exhaustive over `Command`.
            Command::Abend { .. } => Ok(Resp::OK),
            Command::AskTime { into } => self.do_asktime(into),
            Command::FormatTime { into } => self.do_formattime(into),
            Command::Assign { query, into } => self.do_assign(query, into),
            Command::WriteQ { queue, from, item_into } => self.do_writeq(&queue, from, item_into),
            Command::ReadQ { queue, into, item } => self.do_readq(&queue, into, item),
            Command::DeleteQ { queue } => self.do_deleteq(&queue),
            Command::Start { transaction_id, from } => self.do_start(&transaction_id, from),
            Command::Cancel { req_id } => self.do_cancel(&req_id),
            Command::Sql { text, params, outputs, status_area } => self.do_sql(&text, &params, outputs, status_area),
            Command::Put { channel, from } => self.do_put(&channel, from),
            Command::Get { channel, target } => self.do_get(&channel, target),
            Command::Inquire { into } => self.do_inquire(into),
        }
    }
}
