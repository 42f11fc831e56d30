//! Identity resolution states and outcomes.

use std::fmt;

use serde::Serialize;

use super::entity::Actor;

/// States of the "find my actor" state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    Start,
    CheckHint,
    CheckCache,
    CheckAuthoritativeMap,
    DirectQueryWithRetry,
    RepairAndRetry,
    Resolved,
    Unresolved,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::CheckHint => "CHECK_HINT",
            Self::CheckCache => "CHECK_CACHE",
            Self::CheckAuthoritativeMap => "CHECK_AUTHORITATIVE_MAP",
            Self::DirectQueryWithRetry => "DIRECT_QUERY_WITH_RETRY",
            Self::RepairAndRetry => "REPAIR_AND_RETRY",
            Self::Resolved => "RESOLVED",
            Self::Unresolved => "UNRESOLVED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Unresolved)
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resolved actor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Local hint, confirmed by the authoritative map.
    Hint,
    /// Cached actor, confirmed by the authoritative map.
    Cache,
    AuthoritativeMap,
    /// Mapping written (or converged) by the repair path.
    Repair,
    /// Found by reading the game's actor collection, then repaired.
    CollectionScan,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::Cache => "cache",
            Self::AuthoritativeMap => "authoritative_map",
            Self::Repair => "repair",
            Self::CollectionScan => "collection_scan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved {
        actor: Actor,
        source: ResolutionSource,
    },
    /// No actor yet; the view should offer the join/select flow.
    Unresolved,
}

/// Result of one identity lookup, including the states it went through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorResolution {
    pub game_id: String,
    pub user_id: String,
    pub outcome: ResolutionOutcome,
    pub trace: Vec<ResolutionState>,
}

impl ActorResolution {
    pub fn actor(&self) -> Option<&Actor> {
        match &self.outcome {
            ResolutionOutcome::Resolved { actor, .. } => Some(actor),
            ResolutionOutcome::Unresolved => None,
        }
    }

    pub fn into_actor(self) -> Option<Actor> {
        match self.outcome {
            ResolutionOutcome::Resolved { actor, .. } => Some(actor),
            ResolutionOutcome::Unresolved => None,
        }
    }

    pub fn source(&self) -> Option<ResolutionSource> {
        match &self.outcome {
            ResolutionOutcome::Resolved { source, .. } => Some(*source),
            ResolutionOutcome::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Resolved { .. })
    }

    pub fn visited(&self, state: ResolutionState) -> bool {
        self.trace.contains(&state)
    }
}

/// Authoritative (game, user) -> actor association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityMapping {
    pub game_id: String,
    pub user_id: String,
    pub actor_id: String,
}

/// Outcome of a confirmed mapping repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// The mapping reads back as the requested actor.
    Confirmed { actor_id: String },
    /// A concurrent writer won; the mapping converged on another actor.
    Superseded { requested: String, winner: String },
    /// The requested actor does not exist or is not the user's actor in this game.
    Rejected { reason: String },
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}
