// (C) 2020 Brandon Lewis
//
// The set of runtime errors the engine can produce.
//
// All of these are fatal to the running program except Halt, which is
// the internal sentinel for clean termination, and RuntimeException,
// which is only reached after unwinding finds no handler. User-level
// THROW never surfaces here directly; it is routed through the handler
// chain first.

use thiserror::Error;

use crate::value::{TypeSet, TypeTag};

// The result of any engine operation.
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    #[error("stack underflow")]
    StackUnderflow,
    // Covers the operand stack and the call/loop/switch frame stacks.
    #[error("stack overflow")]
    StackOverflow,
    #[error("invalid instruction")]
    InvalidInstruction,
    #[error("invalid jump target {0}")]
    InvalidJump(i64),
    #[error("type error: expected {expect:?}, got {got:?}")]
    TypeError { expect: TypeSet, got: TypeTag },
    #[error("type mismatch: {0:?} vs {1:?}")]
    TypeMismatch(TypeTag, TypeTag),
    #[error("invalid cast")]
    InvalidCast,
    #[error("undefined variable")]
    UndefinedVariable,
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {0} out of bounds")]
    IndexOutOfBounds(i64),
    #[error("key not found")]
    KeyNotFound,
    #[error("break outside loop")]
    BreakOutsideLoop,
    #[error("continue outside loop")]
    ContinueOutsideLoop,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("uncaught exception: {0}")]
    RuntimeException(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("halt")]
    Halt,
}
