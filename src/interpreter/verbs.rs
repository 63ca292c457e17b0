//! Per-verb commit logic (§4.6 "Verb-commit semantics").

use super::{AddressTarget, AssignQuery, Interpreter};
use crate::enqueue::Scope;
use crate::error::{Error, Resp, Result};
use crate::field::{Field, Type};
use crate::loader::ResolvedEntry;
use crate::sql;
use crate::task::COMM_AREA_LEN;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

impl<'t, S: Read + Write> Interpreter<'t, S> {
    pub(super) fn do_send(&mut self, map: Option<String>, mapset: Option<String>, from: Option<Field>) -> Result<Resp> {
        self.channel.write_keyword("SEND")?;
        if let Some(map) = &map {
            self.channel.write_keyword("MAP")?;
            self.channel.write_literal(map)?;
        }
        if let Some(mapset) = &mapset {
            self.channel.write_keyword("MAPSET")?;
            self.channel.write_literal(mapset)?;
        }
        if let (Some(map), Some(mapset)) = (&map, &mapset) {
            if let Some(json) = read_copybook_json(self.copybook_dir, mapset, map) {
                self.channel.write_json(&json)?;
            }
        }
        if let Some(field) = &from {
            self.channel.write_keyword("FROM")?;
            self.channel.write_value(&field.display())?;
        }
        self.channel.write_blank_line()?;
        Ok(Resp::OK)
    }

    pub(super) fn do_receive(&mut self, mut into: Field, max_length: usize) -> Result<Resp> {
        self.channel.write_keyword("RECEIVE")?;
        self.channel.write_size(max_length)?;
        self.channel.write_blank_line()?;

        let n = max_length.min(into.len());
        let bytes = self.channel.read_exact_bytes(n)?;
        let dst = into.as_bytes_mut();
        dst[..n].copy_from_slice(&bytes);

        let (resp, resp2) = self.channel.read_resp_pair()?;
        Ok(Resp::new(resp, resp2))
    }

    pub(super) fn do_link(&mut self, program: &str, mut commarea: Option<Field>, mut params: Vec<Field>) -> Result<Resp> {
        if let Some(f) = &commarea {
            if f.len() > COMM_AREA_LEN {
                return Err(Error::InvalidLength("commarea exceeds 32768 bytes"));
            }
        }
        self.task.push_link(program, commarea.as_ref().map(Field::len).unwrap_or(0))?;
        self.serializer.enter(program);
        let outcome = self.invoke_entry(program, commarea.as_mut(), &mut params);
        self.serializer.leave(program);
        self.task.pop_link();
        outcome?;
        Ok(Resp::OK)
    }

    pub(super) fn do_xctl(&mut self, program: &str, mut commarea: Option<Field>, mut params: Vec<Field>) -> Result<Resp> {
        self.serializer.enter(program);
        let outcome = self.invoke_entry(program, commarea.as_mut(), &mut params);
        self.serializer.leave(program);
        outcome?;
        Ok(Resp::OK)
    }

    /// Resolves and invokes `program`'s entry point, copying `commarea`
    /// in before the call and back out after, and passing `params` as
    /// the positional-parameter bank (§4.4, §6 Artifact ABI).
    fn invoke_entry(&mut self, program: &str, commarea: Option<&mut Field>, params: &mut [Field]) -> Result<()> {
        let resolved = self.call_cache.resolve(self.loader, program)?;

        if let Some(f) = &commarea {
            let n = f.len().min(self.task.comm_area.len());
            self.task.comm_area[..n].copy_from_slice(&f.as_bytes()[..n]);
        }

        if let ResolvedEntry::Native(entry, _library) = resolved {
            // SAFETY: `entry` was resolved from a shared object matching
            // the documented `void entry(void* commarea, void* p1, …,
            // void* pN)` ABI (§6); `comm_area` is a stable-address boxed
            // buffer and every field in `params` outlives this call for
            // the life of the task.
            unsafe {
                crate::loader::call_entry(entry, self.task.comm_area.as_mut_ptr() as *mut std::os::raw::c_void, params);
            }
        }

        if let Some(f) = commarea {
            let n = f.len().min(self.task.comm_area.len());
            f.as_bytes_mut()[..n].copy_from_slice(&self.task.comm_area[..n]);
        }
        Ok(())
    }

    pub(super) fn do_getmain(&mut self, mut ptr_field: Field, length: usize, shared: bool, init_byte: Option<u8>) -> Result<Resp> {
        if length == 0 {
            return Err(Error::InvalidLength("getmain length must be non-zero"));
        }
        let ptr = if shared {
            self.shared_arena.getmain(length, init_byte)?
        } else {
            self.task.memory.getmain(length, init_byte)?
        };
        ptr_field.set_numeric_value(ptr as i64)?;
        Ok(Resp::OK)
    }

    /// Searches the task pool first, then the shared arena, matching
    /// §4.2 ("`freemain` searches task pool first, then shared pool").
    pub(super) fn do_freemain(&mut self, ptr: *mut u8) -> Result<Resp> {
        match self.task.memory.freemain(ptr) {
            Ok(_) => Ok(Resp::OK),
            Err(Error::UnknownPointer) => {
                self.shared_arena.freemain(ptr)?;
                Ok(Resp::OK)
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn do_address(&mut self, target: AddressTarget, mut ptr_field: Field) -> Result<Resp> {
        let ptr = match target {
            AddressTarget::CommArea => self.task.comm_area.as_mut_ptr(),
            AddressTarget::TaskWorkArea => self.task.twa.as_mut_ptr(),
            AddressTarget::TaskUserArea => self.task.tua.as_mut_ptr(),
            AddressTarget::Eib => self.task.eib.as_bytes_mut().as_mut_ptr(),
            AddressTarget::CommonWorkArea => self.cwa,
        };
        ptr_field.set_numeric_value(ptr as i64)?;
        Ok(Resp::OK)
    }

    pub(super) fn do_enq(&mut self, resource: &str, nosuspend: bool, scope: Scope) -> Result<Resp> {
        self.enqueue.enqueue(resource, self.task.task_id, scope, nosuspend)?;
        Ok(Resp::OK)
    }

    pub(super) fn do_deq(&mut self, resource: &str, _scope: Scope) -> Result<Resp> {
        self.enqueue.dequeue(resource, self.task.task_id);
        Ok(Resp::OK)
    }

    pub(super) fn do_syncpoint(&mut self, rollback: bool) -> Result<Resp> {
        self.channel.write_keyword("SYNCPOINT")?;
        if rollback {
            self.channel.write_keyword("ROLLBACK")?;
        }
        self.channel.write_blank_line()?;

        let client_said_rollback = self.channel.read_line()?.trim().eq_ignore_ascii_case("ROLLBACK");
        if client_said_rollback && !rollback {
            return Err(Error::RollbackInSyncpoint);
        }

        self.enqueue.release_all(self.task.task_id, Scope::UnitOfWork);
        Ok(Resp::OK)
    }

    /// Emits the bare `RETURN` dialogue (§4.6 token class 1: opening a
    /// verb emits its line to the client channel even when, as here, it
    /// carries no parameters).
    pub(super) fn do_return(&mut self) -> Result<Resp> {
        self.channel.write_keyword("RETURN")?;
        self.channel.write_blank_line()?;
        Ok(Resp::OK)
    }

    pub(super) fn do_asktime(&mut self, mut into: Field) -> Result<Resp> {
        self.channel.write_keyword("ASKTIME")?;
        self.channel.write_blank_line()?;
        let line = self.channel.read_line()?;
        into.set_from_text(line.trim())?;
        Ok(Resp::OK)
    }

    pub(super) fn do_formattime(&mut self, mut into: Field) -> Result<Resp> {
        self.channel.write_keyword("FORMATTIME")?;
        self.channel.write_blank_line()?;
        let line = self.channel.read_line()?;
        into.set_from_text(line.trim())?;
        Ok(Resp::OK)
    }

    pub(super) fn do_assign(&mut self, query: AssignQuery, mut into: Field) -> Result<Resp> {
        let keyword = match query {
            AssignQuery::ApplId => "APPLID",
            AssignQuery::UserId => "USERID",
            AssignQuery::SysId => "SYSID",
            AssignQuery::Tranid => "TRANID",
            AssignQuery::StartCode => "STARTCODE",
        };
        self.channel.write_keyword("ASSIGN")?;
        self.channel.write_keyword(keyword)?;
        self.channel.write_blank_line()?;
        let line = self.channel.read_line()?;
        into.set_from_text(line.trim())?;
        Ok(Resp::OK)
    }

    pub(super) fn do_writeq(&mut self, queue: &str, from: Field, mut item_into: Option<Field>) -> Result<Resp> {
        self.channel.write_keyword("WRITEQ")?;
        self.channel.write_keyword("QUEUE")?;
        self.channel.write_literal(queue)?;
        self.channel.write_size(from.len())?;
        self.channel.write_bytes(from.as_bytes())?;
        self.channel.write_blank_line()?;
        let item_line = self.channel.read_line()?;
        if let Some(field) = item_into.as_mut() {
            let item: i64 = item_line.trim().parse().unwrap_or(0);
            field.set_numeric_value(item)?;
        }
        Ok(Resp::OK)
    }

    pub(super) fn do_readq(&mut self, queue: &str, mut into: Field, item: Option<u32>) -> Result<Resp> {
        self.channel.write_keyword("READQ")?;
        self.channel.write_keyword("QUEUE")?;
        self.channel.write_literal(queue)?;
        if let Some(item) = item {
            self.channel.write_keyword("ITEM")?;
            self.channel.write_value(&item.to_string())?;
        }
        self.channel.write_size(into.len())?;
        self.channel.write_blank_line()?;
        let n = into.len();
        let bytes = self.channel.read_exact_bytes(n)?;
        into.as_bytes_mut().copy_from_slice(&bytes);
        let (resp, resp2) = self.channel.read_resp_pair()?;
        Ok(Resp::new(resp, resp2))
    }

    pub(super) fn do_deleteq(&mut self, queue: &str) -> Result<Resp> {
        self.channel.write_keyword("DELETEQ")?;
        self.channel.write_keyword("QUEUE")?;
        self.channel.write_literal(queue)?;
        self.channel.write_blank_line()?;
        let (resp, resp2) = self.channel.read_resp_pair()?;
        Ok(Resp::new(resp, resp2))
    }

    pub(super) fn do_start(&mut self, transaction_id: &str, from: Option<Field>) -> Result<Resp> {
        self.channel.write_keyword("START")?;
        self.channel.write_literal(transaction_id)?;
        if let Some(field) = &from {
            self.channel.write_keyword("FROM")?;
            self.channel.write_value(&field.display())?;
        }
        self.channel.write_blank_line()?;
        let (resp, resp2) = self.channel.read_resp_pair()?;
        Ok(Resp::new(resp, resp2))
    }

    pub(super) fn do_cancel(&mut self, req_id: &str) -> Result<Resp> {
        self.channel.write_keyword("CANCEL")?;
        self.channel.write_keyword("REQID")?;
        self.channel.write_literal(req_id)?;
        self.channel.write_blank_line()?;
        let (resp, resp2) = self.channel.read_resp_pair()?;
        Ok(Resp::new(resp, resp2))
    }

    /// Runs one embedded SQL statement (§4.5). `BEGIN`/`COMMIT`/`ROLLBACK`
    /// are recognized by text and drive the checked-out connection
    /// directly rather than going through [`sql::execute`], since they
    /// carry no host-variable bindings and no result row; everything
    /// else is a normal statement or query. The SQL Status Area, when
    /// bound, is written through separately from the command's own
    /// resp/resp2 (§4.5: the bridge "set[s] the status area" apart from
    /// resp propagation) — a failed statement still reports the error
    /// code (-1) into the status area before the error itself propagates.
    pub(super) fn do_sql(&mut self, text: &str, params: &[String], mut outputs: Vec<Field>, mut status_area: Option<Field>) -> Result<Resp> {
        match text.trim().to_ascii_uppercase().as_str() {
            "BEGIN" => {
                self.channel.write_keyword("OK")?;
                Ok(Resp::OK)
            }
            verb @ ("COMMIT" | "ROLLBACK") => {
                let conn = self.connection.as_deref_mut().ok_or_else(|| Error::Database("no connection checked out".into()))?;
                let result = conn.query(verb, &[]);
                if verb == "COMMIT" || verb == "ROLLBACK" {
                    self.enqueue.release_all(self.task.task_id, Scope::UnitOfWork);
                }
                match result {
                    Ok(_) => {
                        self.channel.write_keyword("OK")?;
                        Ok(Resp::OK)
                    }
                    Err(e) => {
                        self.channel.write_keyword("ERROR")?;
                        Err(e)
                    }
                }
            }
            _ => {
                let conn = self.connection.as_deref_mut().ok_or_else(|| Error::Database("no connection checked out".into()))?;
                let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
                let status = match sql::execute(conn, text, &param_refs, &mut outputs) {
                    Ok(status) => status,
                    Err(e) => {
                        if let Some(field) = status_area.as_mut() {
                            sql::SqlStatus::error(-1).write_to(field)?;
                        }
                        return Err(e);
                    }
                };
                if let Some(field) = status_area.as_mut() {
                    status.write_to(field)?;
                }
                Ok(Resp::OK)
            }
        }
    }

    pub(super) fn do_put(&mut self, channel: &str, from: Field) -> Result<Resp> {
        self.channel.write_keyword("PUT")?;
        self.channel.write_keyword("CHANNEL")?;
        self.channel.write_literal(channel)?;
        self.channel.write_size(from.len())?;
        self.channel.write_bytes(from.as_bytes())?;
        self.channel.write_blank_line()?;
        self.task.put_channel(channel, from.as_bytes().to_vec())?;
        Ok(Resp::OK)
    }

    pub(super) fn do_get(&mut self, channel: &str, target: super::GetTarget) -> Result<Resp> {
        self.channel.write_keyword("GET")?;
        self.channel.write_keyword("CHANNEL")?;
        self.channel.write_literal(channel)?;
        self.channel.write_blank_line()?;

        let bytes = match self.task.get_channel(channel) {
            Some(bytes) => bytes.to_vec(),
            None => return Err(Error::ChannelBufferNotFound(channel.to_string())),
        };

        match target {
            super::GetTarget::Into(mut into) => {
                let n = bytes.len().min(into.len());
                into.as_bytes_mut()[..n].copy_from_slice(&bytes[..n]);
            }
            super::GetTarget::Set(mut ptr_field) => {
                let ptr = self.task.memory.getmain(bytes.len().max(1), None)?;
                if !bytes.is_empty() {
                    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
                }
                ptr_field.set_numeric_value(ptr as i64)?;
            }
        }
        Ok(Resp::OK)
    }

    pub(super) fn do_inquire(&mut self, mut into: Field) -> Result<Resp> {
        self.channel.write_keyword("INQUIRE")?;
        self.channel.write_blank_line()?;
        let line = self.channel.read_line()?;
        into.set_from_text(line.trim())?;
        Ok(Resp::OK)
    }
}

/// Locates the copybook JSON for `mapname` inside `<mapset>.js` in
/// `dir`, extracting the balanced-brace object that follows the
/// `mapname` substring (§4.6 SEND, grounded on `writeJson`).
fn read_copybook_json(dir: &str, mapset: &str, mapname: &str) -> Option<String> {
    let path = Path::new(dir).join(format!("{mapset}.js"));
    let contents = fs::read_to_string(path).ok()?;
    let start = contents.find(mapname)?;
    let brace_start = contents[start..].find('{')? + start;

    let mut depth = 0i32;
    for (offset, ch) in contents[brace_start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(contents[brace_start..brace_start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copybook_json_extracts_balanced_braces_after_mapname() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("MS1.js"), r#"prefix M1 {"a":1,"b":{"c":2}} suffix"#).unwrap();
        let json = read_copybook_json(dir.path().to_str().unwrap(), "MS1", "M1").unwrap();
        assert_eq!(json, r#"{"a":1,"b":{"c":2}}"#);
    }

    #[test]
    fn copybook_json_missing_mapname_returns_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("MS1.js"), r#"{"a":1}"#).unwrap();
        assert!(read_copybook_json(dir.path().to_str().unwrap(), "MS1", "NOPE").is_none());
    }
}
