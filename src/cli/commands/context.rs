//! `polity context <game>`

use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::cli::output::{list_table, or_dash, output, render_list, truncate, CommandOutput};
use crate::domain::models::{Completeness, Config, GameContext};
use crate::infrastructure::setup::Runtime;

#[derive(Debug, Serialize)]
pub struct ContextOutput {
    #[serde(flatten)]
    pub context: GameContext,
}

impl CommandOutput for ContextOutput {
    fn to_human(&self) -> String {
        let ctx = &self.context;
        let mut out = String::new();

        let _ = writeln!(out, "Game: {}", ctx.game.id);
        let _ = writeln!(out, "  Name:   {}", or_dash(ctx.game.name.as_deref()));
        let _ = writeln!(out, "  Status: {}", or_dash(ctx.game.status.as_deref()));
        if let Some(description) = &ctx.game.description {
            let _ = writeln!(out, "  About:  {}", truncate(description, 72));
        }
        out.push('\n');

        let mut actors = list_table(&["id", "name", "user", "card"]);
        for actor in &ctx.actors {
            actors.add_row(vec![
                truncate(&actor.id, 12),
                or_dash(actor.name.as_deref()),
                or_dash(actor.user_id.as_deref()),
                or_dash(actor.card_id.as_deref()),
            ]);
        }
        let _ = writeln!(out, "{}\n", render_list("actor", &actors, ctx.actors.len()));

        let mut cards = list_table(&["id", "title", "role"]);
        for card in &ctx.cards {
            cards.add_row(vec![
                truncate(&card.id, 12),
                or_dash(card.title.as_deref()),
                or_dash(card.role.as_deref()),
            ]);
        }
        let _ = writeln!(out, "{}\n", render_list("card", &cards, ctx.cards.len()));

        let mut agreements = list_table(&["id", "title", "status", "proposer"]);
        for agreement in &ctx.agreements {
            agreements.add_row(vec![
                truncate(&agreement.id, 12),
                truncate(agreement.title.as_deref().unwrap_or("-"), 40),
                or_dash(agreement.status.as_deref()),
                or_dash(agreement.proposer_id.as_deref()),
            ]);
        }
        let _ = write!(
            out,
            "{}",
            render_list("agreement", &agreements, ctx.agreements.len())
        );

        for read in &ctx.reads {
            if let Completeness::NotConverged { expected, received } = read.completeness {
                let _ = write!(
                    out,
                    "\nwarning: {} saw {received} of {expected} items",
                    read.path
                );
            }
        }
        out
    }
}

pub async fn execute(config: Config, game: String, refresh: bool, json_mode: bool) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let context = if refresh {
        runtime.service.refresh_game(&game).await?
    } else {
        runtime.service.get_game_context(&game).await?
    };
    let context = context.ok_or_else(|| anyhow!("Game {game} not found on this peer"))?;

    output(&ContextOutput { context }, json_mode);
    Ok(())
}
