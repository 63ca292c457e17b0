//! The client channel's line-oriented text protocol (§6).
//!
//! Every verb dialogue is built from the same small vocabulary: a
//! keyword line, a `=value` line, a `SIZE`/`=<n>` pair announcing a
//! field's byte width before read-back, and — for multi-line blocks — a
//! terminating blank line followed by the client's `<resp>\n<resp2>\n`
//! response pair. [`ClientChannel`] is the thin read/write layer the
//! command interpreter drives; it knows the line shapes, not the verb
//! semantics.

use std::io::{self, BufRead, BufReader, Write};

/// A bidirectional client channel over any stream that is both `Read`
/// and `Write` (a `TcpStream` in production, an in-memory pipe in
/// tests).
pub struct ClientChannel<S> {
    reader: BufReader<S>,
}

impl<S: io::Read + io::Write> ClientChannel<S> {
    pub fn new(stream: S) -> Self {
        ClientChannel { reader: BufReader::new(stream) }
    }

    fn write_raw(&mut self, s: &str) -> io::Result<()> {
        self.reader.get_mut().write_all(s.as_bytes())
    }

    /// Writes a bare keyword or verb-name line (`SEND`, `RETURN`, …).
    pub fn write_keyword(&mut self, keyword: &str) -> io::Result<()> {
        self.write_raw(keyword)?;
        self.write_raw("\n")
    }

    /// Writes `=value\n`. String literals (`MAP('M1')`-style parameters)
    /// are wrapped in single quotes by the caller before reaching here;
    /// this only appends the `=` prefix and trailing newline.
    pub fn write_value(&mut self, value: &str) -> io::Result<()> {
        self.write_raw("=")?;
        self.write_raw(value)?;
        self.write_raw("\n")
    }

    /// Writes a single-quoted string literal value.
    pub fn write_literal(&mut self, value: &str) -> io::Result<()> {
        self.write_value(&format!("'{value}'"))
    }

    /// Writes the `SIZE\n=<n>\n` pair that precedes a read-back.
    pub fn write_size(&mut self, n: usize) -> io::Result<()> {
        self.write_keyword("SIZE")?;
        self.write_value(&n.to_string())
    }

    /// Writes an inline JSON payload line (`JSON=<json>`).
    pub fn write_json(&mut self, json: &str) -> io::Result<()> {
        self.write_raw("JSON=")?;
        self.write_raw(json)?;
        self.write_raw("\n")
    }

    /// Writes the blank line that terminates a multi-line block before
    /// the client sends its resp/resp2 response pair.
    pub fn write_blank_line(&mut self) -> io::Result<()> {
        self.write_raw("\n")
    }

    /// Writes raw bytes with no framing of their own (the payload half of
    /// a `SIZE`-prefixed block the caller already announced).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.reader.get_mut().write_all(bytes)
    }

    pub fn write_commarea(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_keyword("COMMAREA")?;
        self.write_size(bytes.len())?;
        self.reader.get_mut().write_all(bytes)?;
        self.write_raw("\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.reader.get_mut().flush()
    }

    /// Unwraps the channel, returning the underlying stream (tests
    /// inspect an in-memory pipe's accumulated output this way).
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Reads one line, stripped of its trailing `\n` (and `\r` if
    /// present).
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "client channel closed"));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Reads exactly `n` raw bytes (a `RECEIVE`/`COMMAREA` payload
    /// announced by a preceding `SIZE`).
    pub fn read_exact_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads the terminating `<resp>\n<resp2>\n` pair the client sends
    /// after a multi-line block.
    pub fn read_resp_pair(&mut self) -> io::Result<(i32, i32)> {
        let resp = self.read_line()?.trim().parse().unwrap_or(0);
        let resp2 = self.read_line()?.trim().parse().unwrap_or(0);
        Ok((resp, resp2))
    }
}
