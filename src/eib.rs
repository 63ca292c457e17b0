//! The Exec-Interface Block: a 150-byte per-task status buffer with fixed
//! field offsets (§3 "Exec-Interface Block (EIB)").
//!
//! Every artifact invocation can read this buffer through `ADDRESS
//! SET(...) EIB` (§4.6). Offsets and widths are exactly those of §3; the
//! packed-decimal time/date/task-id fields reuse [`crate::field`]'s packed
//! encoding so the bytes an artifact sees are indistinguishable from a
//! genuine COBOL `COMP-3` item.

use crate::error::Resp;
use crate::field::{decode_packed_decimal, encode_packed_decimal};

pub const EIB_LEN: usize = 150;

const TIME_OFFSET: usize = 0;
const DATE_OFFSET: usize = 4;
const TRANSACTION_ID_OFFSET: usize = 8;
const TASK_ID_OFFSET: usize = 12;
const TERMINAL_ID_OFFSET: usize = 16;
const REQUEST_ID_OFFSET: usize = 43;
const RESP_OFFSET: usize = 76;
const RESP2_OFFSET: usize = 80;

/// The per-task EIB buffer.
#[derive(Clone)]
pub struct Eib {
    buf: [u8; EIB_LEN],
}

impl Default for Eib {
    fn default() -> Self {
        Eib { buf: [0u8; EIB_LEN] }
    }
}

impl Eib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8; EIB_LEN] {
        &self.buf
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; EIB_LEN] {
        &mut self.buf
    }

    /// Populates time, date, task id, transaction id, terminal id and
    /// request id for a freshly started task (§4.6 "EIB maintenance",
    /// first `DFHEIBLK` access at link-depth 0).
    ///
    /// The date is encoded as `year*1000 + day_of_year`, not the
    /// conventional Julian `yyyyddd` — this preserves the original
    /// implementation's observed behavior (§9 open question); see
    /// DESIGN.md for the rationale.
    pub fn populate(
        &mut self,
        now: chrono::NaiveDateTime,
        task_id: u32,
        transaction_id: &str,
        terminal_id: &str,
        request_id: &str,
    ) {
        use chrono::Datelike;
        use chrono::Timelike;

        let hhmmss = now.hour() as i64 * 10000 + now.minute() as i64 * 100 + now.second() as i64;
        self.set_packed(TIME_OFFSET, 4, hhmmss);

        let yyddd = now.year() as i64 * 1000 + now.ordinal0() as i64;
        self.set_packed(DATE_OFFSET, 4, yyddd);

        self.set_packed(TASK_ID_OFFSET, 4, task_id as i64);
        self.set_text_field(TRANSACTION_ID_OFFSET, 8, transaction_id, b' ');
        self.set_text_field(TERMINAL_ID_OFFSET, 4, terminal_id, b'0');
        self.set_text_field(REQUEST_ID_OFFSET, 8, request_id, b' ');
    }

    pub fn task_id(&self) -> i64 {
        decode_packed_decimal(&self.buf[TASK_ID_OFFSET..TASK_ID_OFFSET + 4]).0
    }

    pub fn set_resp(&mut self, resp: Resp) {
        self.buf[RESP_OFFSET..RESP_OFFSET + 4].copy_from_slice(&(resp.resp as i32).to_be_bytes());
        self.buf[RESP2_OFFSET..RESP2_OFFSET + 4].copy_from_slice(&(resp.resp2 as i32).to_be_bytes());
    }

    pub fn resp(&self) -> Resp {
        let resp = i32::from_be_bytes(self.buf[RESP_OFFSET..RESP_OFFSET + 4].try_into().unwrap());
        let resp2 = i32::from_be_bytes(self.buf[RESP2_OFFSET..RESP2_OFFSET + 4].try_into().unwrap());
        Resp::new(resp, resp2)
    }

    fn set_packed(&mut self, offset: usize, len: usize, v: i64) {
        let digits = len * 2 - 1;
        let encoded = encode_packed_decimal(v, digits, len);
        self.buf[offset..offset + len].copy_from_slice(&encoded);
    }

    fn set_text_field(&mut self, offset: usize, len: usize, text: &str, pad: u8) {
        let src = text.as_bytes();
        let n = src.len().min(len);
        self.buf[offset..offset + n].copy_from_slice(&src[..n]);
        for b in &mut self.buf[offset + n..offset + len] {
            *b = pad;
        }
    }
}
