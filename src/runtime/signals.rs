//! Control-Flow Signals
//!
//! `break` and `return` unwind the evaluator the same way errors do, but
//! they are not errors: they carry a value and stop at the nearest
//! enclosing loop/iterator (`break`) or closure body (`return`). The
//! evaluator's error channel is therefore a three-way interrupt.

use super::errors::RillError;
use super::value::Value;

/// Why an evaluation stopped early.
#[derive(Debug)]
pub enum Interrupt {
    /// A real error; propagates to the host.
    Failure(Box<RillError>),
    /// `break`, carrying the value of its pipe chain.
    Break(Value),
    /// `return`, carrying the value of its pipe chain.
    Return(Value),
}

impl Interrupt {
    /// True for break/return, false for failures.
    pub fn is_control_signal(&self) -> bool {
        matches!(self, Interrupt::Break(_) | Interrupt::Return(_))
    }
}

impl From<RillError> for Interrupt {
    fn from(e: RillError) -> Self {
        Interrupt::Failure(Box::new(e))
    }
}

/// Result of evaluating any node.
pub type EvalResult = Result<Value, Interrupt>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::ids;

    #[test]
    fn test_signal_classification() {
        assert!(Interrupt::Break(Value::Null).is_control_signal());
        assert!(Interrupt::Return(Value::Number(1.0)).is_control_signal());
        let failure: Interrupt = RillError::new(ids::RUNTIME, "boom").into();
        assert!(!failure.is_control_signal());
    }
}
