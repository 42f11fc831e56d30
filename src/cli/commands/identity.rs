//! `polity whoami`, `polity repair` and `polity join`

use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{or_dash, output, CommandOutput};
use crate::domain::models::{
    Actor, ActorResolution, Config, RepairOutcome, ResolutionOutcome, ResolutionState,
};
use crate::infrastructure::setup::Runtime;

#[derive(Debug, Serialize)]
pub struct WhoamiOutput {
    #[serde(flatten)]
    pub resolution: ActorResolution,
}

impl CommandOutput for WhoamiOutput {
    fn to_human(&self) -> String {
        let r = &self.resolution;
        let mut out = String::new();
        match &r.outcome {
            ResolutionOutcome::Resolved { actor, source } => {
                let _ = writeln!(out, "{} plays {} in game {}", r.user_id, actor.id, r.game_id);
                let _ = writeln!(out, "  Name:   {}", or_dash(actor.name.as_deref()));
                let _ = writeln!(out, "  Card:   {}", or_dash(actor.card_id.as_deref()));
                let _ = writeln!(out, "  Source: {}", source.as_str());
            }
            ResolutionOutcome::Unresolved => {
                let _ = writeln!(out, "{} has no actor in game {}", r.user_id, r.game_id);
                let _ = writeln!(
                    out,
                    "  Join with: polity join {} {} --card <CARD>",
                    r.game_id, r.user_id
                );
            }
        }
        let trace: Vec<&str> = r.trace.iter().map(ResolutionState::as_str).collect();
        let _ = write!(out, "  Path:   {}", trace.join(" -> "));
        out
    }
}

#[derive(Debug, Serialize)]
pub struct RepairOutput {
    pub game_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: RepairOutcome,
}

impl CommandOutput for RepairOutput {
    fn to_human(&self) -> String {
        match &self.outcome {
            RepairOutcome::Confirmed { actor_id } => format!(
                "Mapping confirmed: {} -> {actor_id} in game {}",
                self.user_id, self.game_id
            ),
            RepairOutcome::Superseded { requested, winner } => format!(
                "Another writer won: {} -> {winner} in game {} (requested {requested})",
                self.user_id, self.game_id
            ),
            RepairOutcome::Rejected { reason } => format!("Repair rejected: {reason}"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JoinOutput {
    pub game_id: String,
    pub actor: Actor,
}

impl CommandOutput for JoinOutput {
    fn to_human(&self) -> String {
        format!(
            "Joined game {} as {} ({})",
            self.game_id,
            self.actor.name.as_deref().unwrap_or("unnamed actor"),
            self.actor.id
        )
    }
}

pub async fn whoami(config: Config, game: String, user: String, json_mode: bool) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let resolution = runtime.service.explain_my_actor(&game, &user).await?;
    // Resolution may have repaired the mapping.
    runtime.persist().await?;

    output(&WhoamiOutput { resolution }, json_mode);
    Ok(())
}

pub async fn repair(
    config: Config,
    game: String,
    user: String,
    actor: String,
    json_mode: bool,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let outcome = runtime
        .service
        .repair_identity_mapping(&game, &user, &actor)
        .await?;
    runtime.persist().await?;

    output(
        &RepairOutput {
            game_id: game,
            user_id: user,
            outcome,
        },
        json_mode,
    );
    Ok(())
}

pub async fn join(
    config: Config,
    game: String,
    user: String,
    card: String,
    name: Option<String>,
    json_mode: bool,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let actor = runtime
        .service
        .join_game(&game, &user, &card, name.as_deref())
        .await?;
    runtime.persist().await?;

    output(&JoinOutput { game_id: game, actor }, json_mode);
    Ok(())
}
