//! Scope frames, per-local bookkeeping, and the nilness lattice.

use std::collections::HashMap;

use crate::diagnostics::Span;

/// Three-valued lattice for whether a local may currently hold `nil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nilness {
    NonNil,
    MaybeNil,
    Unknown,
}

impl Nilness {
    /// Control-flow join: both sides non-nil stay non-nil, any unknown
    /// poisons to unknown, everything else is maybe-nil.
    #[must_use]
    pub fn join(self, other: Nilness) -> Nilness {
        match (self, other) {
            (Nilness::Unknown, _) | (_, Nilness::Unknown) => Nilness::Unknown,
            (Nilness::NonNil, Nilness::NonNil) => Nilness::NonNil,
            _ => Nilness::MaybeNil,
        }
    }
}

/// Analyzer bookkeeping for one locally bound name.
#[derive(Debug, Clone)]
pub struct LocalInfo {
    pub used: bool,
    pub assigned: bool,
    pub nilness: Nilness,
    /// Bare annotation name, when the declaration had one. Drives enum
    /// match exhaustiveness.
    pub type_name: Option<String>,
    pub decl_span: Span,
}

/// One frame of the linear scope chain. Also carries the enum-items table
/// used for match exhaustiveness.
#[derive(Debug, Default)]
pub struct Scope {
    pub locals: HashMap<String, LocalInfo>,
    pub enums: HashMap<String, Vec<String>>,
}

/// Copy of the mutable flow-sensitive bits (assignment and nilness) of
/// every local in every frame. Control-flow joins work on these copies;
/// frames are never shared between branches.
pub type StateSnapshot = Vec<HashMap<String, (bool, Nilness)>>;

/// Per-statement control-flow summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowSummary {
    /// Every path through the statement returns.
    pub always_returns: bool,
    /// Some `return` carried a value.
    pub any_with: bool,
    /// Some `return` carried no value.
    pub any_without: bool,
}

impl FlowSummary {
    /// Join across mutually exclusive branches.
    #[must_use]
    pub fn branch(self, other: FlowSummary) -> FlowSummary {
        FlowSummary {
            always_returns: self.always_returns && other.always_returns,
            any_with: self.any_with || other.any_with,
            any_without: self.any_without || other.any_without,
        }
    }

    /// Accumulate the summary of the next statement in a sequence.
    pub fn extend(&mut self, next: FlowSummary) {
        self.always_returns = self.always_returns || next.always_returns;
        self.any_with = self.any_with || next.any_with;
        self.any_without = self.any_without || next.any_without;
    }
}
