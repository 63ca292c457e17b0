//! Abnormal task termination and condition-handler dispatch (§4.7),
//! grounded on `setJmpAbend`/`abend`.
//!
//! A resp/resp2 pair becomes an abend in exactly two situations: the
//! embedded command has no bound RESP field to receive it (the artifact
//! didn't code `RESP(...)`), or the artifact explicitly issued `EXEC CICS
//! ABEND`. Either way the resp is first translated to a four-character
//! abend code; if the artifact registered a handler for that condition
//! (or for `ERROR`/`ABEND` generally) control transfers there instead of
//! unwinding the task.

use crate::error::Resp;

/// Maps a resp value to its four-character abend code (§4.7, `abend`
/// lines 661-729). Resp values not explicitly listed by the original
/// fall back to `ASRA`, the generic abnormal-termination code.
pub fn abcode_for_resp(resp: i32) -> &'static str {
    match resp {
        16 => "A47B",
        22 => "AEIV",
        23 => "AEIW",
        26 => "AEIZ",
        27 => "AEI0",
        28 => "AEI1",
        44 => "AEYH",
        _ => "ASRA",
    }
}

/// Whether control should transfer to a registered handler or the task
/// should unwind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbendOutcome<'a> {
    /// A `HANDLE CONDITION`/`HANDLE ABEND` label is registered; transfer
    /// there with the label name.
    Handled(&'a str),
    /// No handler registered; the task terminates.
    Unhandled,
}

/// An abnormal termination event, carrying the code the client sees
/// (§6: the terminal `ABEND=<code>` line).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Abend {
    pub code: String,
    pub resp: Resp,
    /// `true` if the artifact issued `EXEC CICS ABEND` directly, `false`
    /// if this is a resp promoted to an abend for lack of a bound RESP
    /// field.
    pub explicit: bool,
}

impl Abend {
    pub fn from_resp(resp: Resp, explicit: bool) -> Self {
        Abend { code: abcode_for_resp(resp.resp).to_string(), resp, explicit }
    }

    pub fn from_code(code: impl Into<String>) -> Self {
        Abend { code: code.into(), resp: Resp::new(0, 0), explicit: true }
    }
}

/// The per-task table of registered condition handlers (`HANDLE
/// CONDITION <name> <label>`, `HANDLE ABEND <label>`).
#[derive(Default)]
pub struct ConditionHandlers {
    by_condition: std::collections::HashMap<String, String>,
    abend_label: Option<String>,
}

impl ConditionHandlers {
    pub fn register_condition(&mut self, condition: &str, label: &str) {
        self.by_condition.insert(condition.to_ascii_uppercase(), label.to_string());
    }

    pub fn register_abend(&mut self, label: &str) {
        self.abend_label = Some(label.to_string());
    }

    pub fn clear_condition(&mut self, condition: &str) {
        self.by_condition.remove(&condition.to_ascii_uppercase());
    }

    pub fn clear_abend(&mut self) {
        self.abend_label = None;
    }

    /// Resolves where control transfers for `abend`: a condition-specific
    /// handler wins over the general `HANDLE ABEND` label.
    pub fn resolve<'a>(&'a self, abend: &Abend) -> AbendOutcome<'a> {
        if let Some(label) = self.by_condition.get(&abend.code) {
            return AbendOutcome::Handled(label);
        }
        if let Some(label) = &self.abend_label {
            return AbendOutcome::Handled(label);
        }
        AbendOutcome::Unhandled
    }
}

/// The task's fault/run state (§4.7). A simulated fault forces the extra
/// terminal `STOP` line the original's SIGSEGV handler emits before
/// unwinding — modeled here as a method rather than an installed signal
/// handler, since nothing this monitor does can trigger a genuine
/// segmentation fault from safe Rust.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Normal,
    Faulted,
}

pub struct FaultSimulator {
    state: RunState,
}

impl FaultSimulator {
    pub fn new() -> Self {
        FaultSimulator { state: RunState::Normal }
    }

    pub fn simulate_fault(&mut self) -> Abend {
        self.state = RunState::Faulted;
        Abend::from_code("ASRA")
    }

    pub fn state(&self) -> RunState {
        self.state
    }
}

impl Default for FaultSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_resps_map_to_documented_abcodes() {
        assert_eq!(abcode_for_resp(16), "A47B");
        assert_eq!(abcode_for_resp(27), "AEI0");
        assert_eq!(abcode_for_resp(44), "AEYH");
    }

    #[test]
    fn unlisted_resp_falls_back_to_asra() {
        assert_eq!(abcode_for_resp(999), "ASRA");
    }

    #[test]
    fn condition_specific_handler_wins_over_general_abend_handler() {
        let mut handlers = ConditionHandlers::default();
        handlers.register_abend("GENERAL-HANDLER");
        handlers.register_condition("AEI0", "SPECIFIC-HANDLER");
        let abend = Abend::from_resp(Resp::new(27, 3), false);
        assert_eq!(handlers.resolve(&abend), AbendOutcome::Handled("SPECIFIC-HANDLER"));
    }

    #[test]
    fn unregistered_abend_is_unhandled() {
        let handlers = ConditionHandlers::default();
        let abend = Abend::from_resp(Resp::new(27, 3), false);
        assert_eq!(handlers.resolve(&abend), AbendOutcome::Unhandled);
    }

    #[test]
    fn simulated_fault_sets_faulted_run_state() {
        let mut sim = FaultSimulator::new();
        assert_eq!(sim.state(), RunState::Normal);
        let abend = sim.simulate_fault();
        assert_eq!(sim.state(), RunState::Faulted);
        assert_eq!(abend.code, "ASRA");
    }
}
