//! Shared error type across opcage crates.

use thiserror::Error;

use crate::symbol::MemberKind;

/// Stable failure categories (stable API).
///
/// Hosts branch on these to tell a static policy violation from a runtime
/// budget violation from a guest program fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A denied symbol reference, caught before execution.
    PolicyViolation,
    /// Stack budget exhausted during a guarded invocation.
    StackBudget,
    /// Array-allocation budget exceeded during a guarded invocation.
    ArrayBudget,
    /// Wall-clock budget exceeded during a guarded invocation.
    TimeBudget,
    /// Programming error in the caller or in opcage itself.
    Contract,
    /// Malformed image or policy document.
    BadInput,
    /// The guest program misbehaved at runtime (not a budget failure).
    ProgramFault,
    /// Internal failure (I/O and similar).
    Internal,
}

impl FailureKind {
    /// String representation used in CLI output and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::PolicyViolation => "POLICY_VIOLATION",
            FailureKind::StackBudget => "STACK_BUDGET",
            FailureKind::ArrayBudget => "ARRAY_BUDGET",
            FailureKind::TimeBudget => "TIME_BUDGET",
            FailureKind::Contract => "CONTRACT",
            FailureKind::BadInput => "BAD_INPUT",
            FailureKind::ProgramFault => "PROGRAM_FAULT",
            FailureKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, OpcageError>;

/// Unified error type used by core and host.
#[derive(Debug, Error)]
pub enum OpcageError {
    #[error("namespace {0} is not allowed")]
    DeniedNamespace(String),
    #[error("type {0} is not allowed")]
    DeniedType(String),
    #[error("{kind} {symbol} is not allowed")]
    DeniedMember { symbol: String, kind: MemberKind },
    #[error("stack budget exceeded: {used} of {limit} bytes")]
    StackBudget { used: u64, limit: u64 },
    #[error("array length {requested} exceeds limit {limit}")]
    ArrayBudget { requested: u64, limit: u64 },
    #[error("time budget of {limit_ms} ms exceeded")]
    TimeBudget { limit_ms: u64 },
    #[error("contract violation: {0}")]
    Contract(String),
    #[error("bad image: {0}")]
    BadImage(String),
    #[error("bad policy: {0}")]
    BadPolicy(String),
    #[error("program fault: {0}")]
    Fault(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl OpcageError {
    /// Map an error to its stable failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            OpcageError::DeniedNamespace(_)
            | OpcageError::DeniedType(_)
            | OpcageError::DeniedMember { .. } => FailureKind::PolicyViolation,
            OpcageError::StackBudget { .. } => FailureKind::StackBudget,
            OpcageError::ArrayBudget { .. } => FailureKind::ArrayBudget,
            OpcageError::TimeBudget { .. } => FailureKind::TimeBudget,
            OpcageError::Contract(_) => FailureKind::Contract,
            OpcageError::BadImage(_) | OpcageError::BadPolicy(_) => FailureKind::BadInput,
            OpcageError::Fault(_) => FailureKind::ProgramFault,
            OpcageError::Internal(_) => FailureKind::Internal,
        }
    }
}
