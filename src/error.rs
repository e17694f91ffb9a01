use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config for {path}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures reported by a combat backend or by the adapter's preconditions.
#[derive(Debug, Error)]
pub enum BattleError {
    #[error("battle engine '{0}' is not available")]
    Unavailable(String),

    #[error("battle engine rejected the start request: {0}")]
    Rejected(String),

    #[error("no online players to start a battle")]
    NoOnlinePlayers,

    #[error("no addressed player has an eligible combatant")]
    NoEligibleCombatants,

    #[error("battle engine call failed: {0}")]
    Engine(String),
}

/// World substrate failures. Always treated as "skip this step".
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("entity {0} not found")]
    EntityNotFound(crate::types::EntityId),

    #[error("player {0} is not online")]
    PlayerOffline(crate::types::PlayerId),

    #[error("spawn strategy '{0}' unavailable")]
    SpawnUnavailable(&'static str),

    #[error("world rejected the request: {0}")]
    Rejected(String),
}

/// Feedback for the actor that issued a command. The display text is sent
/// back verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Only players can run this command.")]
    PlayersOnly,

    #[error("You do not have permission to do that.")]
    PermissionDenied,

    #[error("No raid session found in this world.")]
    NoSession,

    #[error("A raid is already in progress.")]
    AlreadyInProgress,

    #[error("No upcoming raid to cancel.")]
    NothingToCancel,

    #[error("No active or waiting raid to stop.")]
    NothingToStop,

    #[error("You were already part of the raid or unable to join.")]
    JoinRejected,

    #[error("Invalid difficulty! Use one of: {0}")]
    InvalidDifficulty(String),

    #[error("You have no pending teleport offer.")]
    NoTeleportOffer,

    #[error("Teleport failed.")]
    TeleportFailed,
}
