//! Per-request session
//!
//! The dispatcher's view of one decoded client request: positional typed
//! arguments in, positional typed outputs back, plus the phase-timeout
//! setting a long-running operation may widen to infinite. The coordinator
//! never touches sockets or framing through this type.

use crate::types::ArgValue;

/// Phase-send timeout requested for the rest of the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutSetting {
    /// Use the configured default.
    #[default]
    Default,
    /// No deadline; used by startup-class long-running operations.
    Infinite,
}

/// One inbound operation's decoded arguments and pending outputs.
pub struct Session {
    args: Vec<ArgValue>,
    outputs: Vec<ArgValue>,
    timeout: TimeoutSetting,
}

impl Session {
    pub fn new(args: Vec<ArgValue>) -> Self {
        Self {
            args,
            outputs: Vec::new(),
            timeout: TimeoutSetting::Default,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn u8_arg(&self, index: usize) -> Option<u8> {
        match self.args.get(index) {
            Some(ArgValue::U8(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn u32_arg(&self, index: usize) -> Option<u32> {
        match self.args.get(index) {
            Some(ArgValue::U32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn u64_arg(&self, index: usize) -> Option<u64> {
        match self.args.get(index) {
            Some(ArgValue::U64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn str_arg(&self, index: usize) -> Option<&str> {
        match self.args.get(index) {
            Some(ArgValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Append one operation-specific output value.
    pub fn add_output(&mut self, value: impl Into<ArgValue>) {
        self.outputs.push(value.into());
    }

    /// Drain the accumulated outputs for the response.
    pub fn take_outputs(&mut self) -> Vec<ArgValue> {
        std::mem::take(&mut self.outputs)
    }

    /// Request an unbounded phase timeout for this operation.
    pub fn set_infinite_timeout(&mut self) {
        self.timeout = TimeoutSetting::Infinite;
    }

    pub fn timeout(&self) -> TimeoutSetting {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_check_position_and_type() {
        let session = Session::new(vec![
            ArgValue::U32(10),
            ArgValue::U32(2),
            ArgValue::Str("openflow".to_string()),
        ]);

        assert_eq!(session.arg_count(), 3);
        assert_eq!(session.u32_arg(0), Some(10));
        assert_eq!(session.str_arg(2), Some("openflow"));
        // Wrong type at the index.
        assert_eq!(session.u64_arg(0), None);
        // Out of range.
        assert_eq!(session.u32_arg(3), None);
    }

    #[test]
    fn outputs_drain_once() {
        let mut session = Session::new(Vec::new());
        session.add_output(9u32);
        session.add_output("running");

        let outputs = session.take_outputs();
        assert_eq!(
            outputs,
            vec![ArgValue::U32(9), ArgValue::Str("running".to_string())]
        );
        assert!(session.take_outputs().is_empty());
    }

    #[test]
    fn timeout_defaults_and_widens() {
        let mut session = Session::new(Vec::new());
        assert_eq!(session.timeout(), TimeoutSetting::Default);
        session.set_infinite_timeout();
        assert_eq!(session.timeout(), TimeoutSetting::Infinite);
    }
}
