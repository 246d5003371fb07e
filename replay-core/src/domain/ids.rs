//! ID types: UUID-backed order/trade identifiers, sequential mark IDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an `Order`/`Trade` pair, assigned by the matching
/// engine on submission. Any strategy-supplied value is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential identifier for a `Mark` row, scoped to a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkId(pub u64);

impl fmt::Display for MarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mark-{}", self.0)
    }
}

/// Monotonically increasing generator for `MarkId`s within one run.
#[derive(Debug, Default)]
pub struct MarkIdGen {
    next: u64,
}

impl MarkIdGen {
    pub fn next_id(&mut self) -> MarkId {
        let id = MarkId(self.next);
        self.next += 1;
        id
    }
}
