//! `polity watch <game>`

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::output::{or_dash, output, CommandOutput};
use crate::domain::models::{Config, Game};
use crate::infrastructure::setup::Runtime;

#[derive(Debug, Serialize)]
pub struct GameUpdateOutput {
    pub game_id: String,
    pub version: usize,
    /// `None` once the game record is deleted.
    pub game: Option<Game>,
}

impl CommandOutput for GameUpdateOutput {
    fn to_human(&self) -> String {
        match &self.game {
            Some(game) => format!(
                "[{}] {}: name={} status={}",
                self.version,
                game.id,
                or_dash(game.name.as_deref()),
                or_dash(game.status.as_deref())
            ),
            None => format!("[{}] {}: deleted", self.version, self.game_id),
        }
    }
}

pub async fn execute(
    config: Config,
    game: String,
    seconds: Option<u64>,
    json_mode: bool,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = runtime
        .service
        .subscribe_to_game(&game, move |update| {
            let _ = tx.send(update);
        })
        .await?;

    let deadline = seconds.map(Duration::from_secs);
    let stop = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    let mut version = 0;
    loop {
        tokio::select! {
            () = &mut stop => break,
            update = rx.recv() => {
                let Some(update) = update else { break };
                version += 1;
                output(
                    &GameUpdateOutput { game_id: game.clone(), version, game: update },
                    json_mode,
                );
            }
        }
    }

    subscription.cancel();
    info!(game = %game, versions = version, "watch finished");
    Ok(())
}
