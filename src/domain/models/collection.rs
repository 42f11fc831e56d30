//! Snapshots produced by bounded reads and the aggregate game context.

use std::time::Duration;

use serde::Serialize;

use super::entity::{Actor, Agreement, Card, Entity, Game};
use super::pointer::GraphPointer;

/// Whether a bounded read saw as many items as the caller expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Completeness {
    /// No expectation given, or the expectation was met.
    Settled,
    /// Fewer items than expected arrived within the window. Possibly complete.
    NotConverged { expected: usize, received: usize },
}

impl Completeness {
    pub fn evaluate(expected: Option<usize>, received: usize) -> Self {
        match expected {
            Some(expected) if received < expected => Self::NotConverged { expected, received },
            _ => Self::Settled,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled)
    }
}

/// Lower-bound snapshot of a collection's children.
///
/// Items are in arrival order, one per child key.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionRead {
    pub path: GraphPointer,
    pub items: Vec<Entity>,
    pub window: Duration,
    pub elapsed: Duration,
    pub completeness: Completeness,
}

impl CollectionRead {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            path: self.path.clone(),
            received: self.items.len(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            completeness: self.completeness,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub path: GraphPointer,
    pub received: usize,
    pub elapsed_ms: u64,
    pub completeness: Completeness,
}

/// Aggregate read backing a game view.
#[derive(Debug, Clone, Serialize)]
pub struct GameContext {
    pub game: Game,
    pub actors: Vec<Actor>,
    pub cards: Vec<Card>,
    pub agreements: Vec<Agreement>,
    pub reads: Vec<CollectionSummary>,
}
