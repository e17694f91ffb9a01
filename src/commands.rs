use serde::Deserialize;
use tracing::debug;

use crate::error::CommandError;
use crate::registry::SessionRegistry;
use crate::teleport::{TeleportReply, CANCELLED_MESSAGE, TELEPORTED_MESSAGE};
use crate::types::PlayerId;
use crate::world::WorldHandle;

pub const JOIN_SUCCESS: &str = "You joined the raid. When you attack the boss like a normal Pixelmon fight, you will be part of the battle.";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RaidCommand {
    Join {
        #[serde(default)]
        teleport: bool,
    },
    Start,
    Cancel,
    Stop,
    Status,
    SetDifficulty {
        name: String,
    },
    /// Answer to a pending teleport offer ("yes"/"y" or "no"/"n").
    Teleport {
        reply: String,
    },
}

impl RaidCommand {
    fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::Cancel | Self::Stop | Self::SetDifficulty { .. }
        )
    }
}

/// Who issued a command. Consoles have no player.
#[derive(Clone, Debug, Default)]
pub struct CommandActor {
    pub player: Option<PlayerId>,
    pub is_admin: bool,
}

impl CommandActor {
    pub fn player(id: PlayerId) -> Self {
        Self {
            player: Some(id),
            is_admin: false,
        }
    }

    pub fn admin(id: Option<PlayerId>) -> Self {
        Self {
            player: id,
            is_admin: true,
        }
    }
}

/// Runs `command` against the session of `world`. The `Ok` text and the
/// `Err` display are both meant for the actor verbatim.
pub fn execute(
    registry: &SessionRegistry,
    world: &WorldHandle,
    actor: &CommandActor,
    command: &RaidCommand,
) -> Result<String, CommandError> {
    if command.requires_admin() && !actor.is_admin {
        return Err(CommandError::PermissionDenied);
    }
    let session = registry.get(&world.id).ok_or(CommandError::NoSession)?;
    debug!(world = %world.id, command = ?command, "raid command");

    match command {
        RaidCommand::Join { teleport } => {
            let player = actor.player.as_ref().ok_or(CommandError::PlayersOnly)?;
            if session.join_raid(player, *teleport) {
                Ok(JOIN_SUCCESS.to_string())
            } else {
                Err(CommandError::JoinRejected)
            }
        }
        RaidCommand::Start => session.force_start(),
        RaidCommand::Cancel => session.force_cancel(),
        RaidCommand::Stop => session.force_stop(),
        RaidCommand::Status => Ok(session.status().message),
        RaidCommand::SetDifficulty { name } => session.set_difficulty(name),
        RaidCommand::Teleport { reply } => {
            let player = actor.player.as_ref().ok_or(CommandError::PlayersOnly)?;
            match registry.services().teleports.respond(player, reply) {
                TeleportReply::Teleported => Ok(TELEPORTED_MESSAGE.to_string()),
                TeleportReply::Cancelled => Ok(CANCELLED_MESSAGE.to_string()),
                TeleportReply::Failed => Err(CommandError::TeleportFailed),
                TeleportReply::NotConsumed => Err(CommandError::NoTeleportOffer),
            }
        }
    }
}
