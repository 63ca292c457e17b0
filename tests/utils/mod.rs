//! Shared scaffolding for the scenario tests in `tests/` (§8 S1-S6):
//! an in-memory, single-ended duplex stream standing in for a real
//! socket, plus a `Harness` that owns the monitor-wide subsystems an
//! `Interpreter` borrows from so each test can build one without a
//! running `Monitor`/`SessionDriver`.

use std::io::{self, Cursor, Read, Write};

use tpcore::enqueue::EnqueueManager;
use tpcore::field::{Field, Type};
use tpcore::interpreter::Interpreter;
use tpcore::loader::{ArtifactLoader, CallCache};
use tpcore::memory::SharedArena;
use tpcore::pool::{Connection, QueryResult};
use tpcore::protocol::ClientChannel;
use tpcore::serializer::ModuleSerializer;

/// A single-ended in-memory stream: reads drain `inbound`, writes
/// accumulate into `outbound`. Mirrors the private `Pipe` test double in
/// `protocol.rs`, exposed here for cross-module scenario tests.
pub struct Pipe {
    inbound: Cursor<Vec<u8>>,
    outbound: Vec<u8>,
}

impl Pipe {
    pub fn new(inbound: impl Into<Vec<u8>>) -> Self {
        Pipe { inbound: Cursor::new(inbound.into()), outbound: Vec::new() }
    }

    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.outbound).into_owned()
    }
}

impl Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inbound.read(buf)
    }
}

impl Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A connection double that returns one scripted [`QueryResult`] per
/// call, then empty results once the script is drained.
pub struct ScriptedConnection {
    pub scripted: Vec<QueryResult>,
}

impl Connection for ScriptedConnection {
    fn query(&mut self, _sql: &str, _params: &[&str]) -> tpcore::Result<QueryResult> {
        if self.scripted.is_empty() {
            return Ok(QueryResult { columns: vec![], rows: vec![], rows_affected: 0 });
        }
        Ok(self.scripted.remove(0))
    }
}

/// Owns the monitor-wide subsystems an [`Interpreter`] borrows from, so
/// scenario tests can build one without a running `Monitor`.
pub struct Harness {
    pub enqueue: EnqueueManager,
    pub serializer: ModuleSerializer,
    pub loader: ArtifactLoader,
    pub shared_arena: SharedArena,
    pub call_cache: CallCache,
    cwa: Box<[u8; 4096]>,
    copybook_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let copybook_dir = tempfile::tempdir().expect("tempdir");
        Harness {
            enqueue: EnqueueManager::new(),
            serializer: ModuleSerializer::new(),
            loader: ArtifactLoader::new("/nonexistent/artifact/directory"),
            shared_arena: SharedArena::new(64),
            call_cache: CallCache::new(64),
            cwa: Box::new([0u8; 4096]),
            copybook_dir,
        }
    }

    /// Writes `<mapset>.js` containing `body` into the harness's
    /// copybook directory (§4.6 SEND, `read_copybook_json`).
    pub fn write_copybook(&self, mapset: &str, body: &str) {
        std::fs::write(self.copybook_dir.path().join(format!("{mapset}.js")), body).expect("write copybook");
    }

    pub fn copybook_dir(&self) -> &str {
        self.copybook_dir.path().to_str().expect("utf-8 tempdir path")
    }

    pub fn cwa_ptr(&self) -> *mut u8 {
        self.cwa.as_ptr() as *mut u8
    }

    /// Builds an `Interpreter` borrowing every subsystem above plus the
    /// caller-supplied task, channel and (optional) connection.
    pub fn interpreter<'t, S>(
        &'t mut self,
        task: &'t mut tpcore::task::TaskContext,
        channel: &'t mut ClientChannel<S>,
        connection: Option<&'t mut dyn Connection>,
    ) -> Interpreter<'t, S> {
        Interpreter {
            task,
            channel,
            enqueue: &self.enqueue,
            serializer: &self.serializer,
            loader: &self.loader,
            call_cache: &mut self.call_cache,
            connection,
            copybook_dir: self.copybook_dir.path().to_str().expect("utf-8 tempdir path"),
            shared_arena: &self.shared_arena,
            cwa: self.cwa.as_mut_ptr(),
        }
    }
}

/// Builds a `Field` over `backing`, matching the unsafe-construction
/// pattern `field.rs`'s own unit tests use.
pub fn field(backing: &mut [u8], kind: Type, digits: usize, scale: usize) -> Field {
    let len = backing.len();
    unsafe { Field::from_raw(backing.as_mut_ptr(), len, kind, digits, scale) }
}
