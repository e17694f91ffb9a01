use dashmap::DashMap;
use tracing::{debug, warn};

use crate::constants::TELEPORT_OFFER_TICKS;
use crate::types::{PlayerId, Position};
use crate::world::WorldHandle;

pub const OFFER_PROMPT: &str = "A raid is starting! Teleport to the raid area? Type yes or no.";
pub const TELEPORTED_MESSAGE: &str = "Teleported to raid area.";
pub const CANCELLED_MESSAGE: &str = "Teleport cancelled.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TeleportReply {
    /// The text was not an answer to a live offer; let it through as chat.
    NotConsumed,
    Teleported,
    Cancelled,
    Failed,
}

struct TeleportOffer {
    world: WorldHandle,
    target: Position,
    expires_at: u64,
}

/// Pending yes/no teleport offers, one per player.
#[derive(Default)]
pub struct TeleportOffers {
    offers: DashMap<PlayerId, TeleportOffer>,
}

impl TeleportOffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, world: &WorldHandle, player: &PlayerId, target: Position) {
        let expires_at = world.host.game_time().saturating_add(TELEPORT_OFFER_TICKS);
        self.offers.insert(
            player.clone(),
            TeleportOffer {
                world: world.clone(),
                target,
                expires_at,
            },
        );
        world.message(player, OFFER_PROMPT);
    }

    pub fn has_offer(&self, player: &PlayerId) -> bool {
        self.offers.contains_key(player)
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn respond(&self, player: &PlayerId, text: &str) -> TeleportReply {
        let answer = text.trim().to_ascii_lowercase();
        let accepted = match answer.as_str() {
            "yes" | "y" => true,
            "no" | "n" => false,
            _ => return TeleportReply::NotConsumed,
        };
        let Some((_, offer)) = self.offers.remove(player) else {
            return TeleportReply::NotConsumed;
        };
        if offer.world.host.game_time() > offer.expires_at {
            debug!(player = %player, "teleport offer expired");
            return TeleportReply::NotConsumed;
        }

        if !accepted {
            offer.world.message(player, CANCELLED_MESSAGE);
            return TeleportReply::Cancelled;
        }
        match offer.world.host.teleport_player(player, offer.target) {
            Ok(()) => {
                offer.world.message(player, TELEPORTED_MESSAGE);
                TeleportReply::Teleported
            }
            Err(error) => {
                warn!(world = %offer.world.id, player = %player, error = %error, "teleport failed");
                TeleportReply::Failed
            }
        }
    }

    /// Drops offers whose expiry tick has passed.
    pub fn purge_expired(&self, now: u64) {
        self.offers.retain(|_, offer| offer.expires_at >= now);
    }
}
