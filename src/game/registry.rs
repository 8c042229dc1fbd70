//! Session Registry
//!
//! Maps each connected player to one slot holding their wallet and their
//! at-most-one live game. Every read-modify-write for a player (debit then
//! create, step then maybe settle, withdraw then delete) happens under that
//! player's own lock; there is no global game lock and cross-player
//! operations never coordinate.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::difficulty::Difficulty;
use super::ledger::{Cents, Player, PlayerId};
use super::outcome::OutcomeSource;
use super::session::{GameSession, GameSnapshot, StepOutcome};
use super::GameError;

/// One player's serialized mutation stream: wallet plus optional live game.
#[derive(Debug)]
pub struct PlayerSlot {
    /// The player's wallet.
    pub player: Player,
    game: Option<GameSession>,
}

impl PlayerSlot {
    /// Create a slot for a freshly connected player.
    pub fn new(player: Player) -> Self {
        Self { player, game: None }
    }

    /// The live game, if any.
    pub fn game(&self) -> Option<&GameSession> {
        self.game.as_ref()
    }

    /// Place a bet and start a game.
    ///
    /// A live game is never silently replaced; a second bet is rejected so
    /// an in-flight debited wager can never leak.
    pub fn begin_game(
        &mut self,
        wager: Cents,
        difficulty: Difficulty,
        outcome: &mut dyn OutcomeSource,
    ) -> Result<GameSnapshot, GameError> {
        if self.game.is_some() {
            return Err(GameError::GameAlreadyActive);
        }
        let session = GameSession::create(&mut self.player, wager, difficulty, outcome)?;
        let snapshot = session.snapshot();
        self.game = Some(session);
        Ok(snapshot)
    }

    /// Advance the live game one step.
    ///
    /// Returns the post-advance snapshot and whether the wallet changed
    /// (true only for the track-exhaustion auto-win). A finished game is
    /// removed from the slot after its final snapshot is taken.
    pub fn step_game(&mut self) -> Result<(GameSnapshot, bool), GameError> {
        let game = self.game.as_mut().ok_or(GameError::NoActiveSession)?;
        let outcome = game.step(&mut self.player)?;
        let snapshot = game.snapshot();
        let settled = matches!(outcome, StepOutcome::ClearedTrack);
        if snapshot.is_finished {
            self.game = None;
        }
        Ok((snapshot, settled))
    }

    /// Cash out the live game. On success the game is settled and removed;
    /// on failure (`NoMovesYet`) it stays live.
    pub fn withdraw_game(&mut self) -> Result<GameSnapshot, GameError> {
        let game = self.game.as_mut().ok_or(GameError::NoActiveSession)?;
        game.withdraw(&mut self.player)?;
        let snapshot = game.snapshot();
        self.game = None;
        Ok(snapshot)
    }

    /// Snapshot of the live game, if any. Pure read.
    pub fn game_snapshot(&self) -> Option<GameSnapshot> {
        self.game.as_ref().map(GameSession::snapshot)
    }

    /// Drop the live game without settlement. The wager stays debited.
    pub fn abandon_game(&mut self) -> Option<GameSession> {
        self.game.take()
    }
}

/// All connected players' slots, keyed by identity.
pub struct SessionRegistry {
    slots: RwLock<BTreeMap<PlayerId, Arc<RwLock<PlayerSlot>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a freshly connected player and return their slot.
    ///
    /// A lingering slot for the same identity (stale connection) is
    /// replaced; any game it held is abandoned unsettled.
    pub async fn connect(&self, player: Player) -> Arc<RwLock<PlayerSlot>> {
        let id = player.id;
        let slot = Arc::new(RwLock::new(PlayerSlot::new(player)));

        let previous = {
            let mut slots = self.slots.write().await;
            slots.insert(id, slot.clone())
        };
        if let Some(previous) = previous {
            let mut prev = previous.write().await;
            if let Some(game) = prev.abandon_game() {
                warn!(
                    player = %id.short_hex(),
                    session = %game.id,
                    "stale slot replaced; abandoned unsettled game"
                );
            }
        }

        info!(player = %id.short_hex(), "player registered");
        slot
    }

    /// Look up a player's slot.
    pub async fn slot(&self, id: &PlayerId) -> Option<Arc<RwLock<PlayerSlot>>> {
        let slots = self.slots.read().await;
        slots.get(id).cloned()
    }

    /// Remove a player on disconnect. An in-flight game is abandoned
    /// without settlement: the wager stays debited and no credit is issued.
    ///
    /// The entry is removed only while `slot` is still the registered one.
    /// A connection superseded by a reconnect holds a stale slot, and its
    /// late teardown must not tear down the fresh connection's slot.
    pub async fn disconnect(&self, id: &PlayerId, slot: &Arc<RwLock<PlayerSlot>>) {
        let removed = {
            let mut slots = self.slots.write().await;
            match slots.get(id) {
                Some(current) if Arc::ptr_eq(current, slot) => slots.remove(id),
                _ => None,
            }
        };
        if let Some(slot) = removed {
            let mut slot = slot.write().await;
            if let Some(game) = slot.abandon_game() {
                warn!(
                    player = %id.short_hex(),
                    session = %game.id,
                    wager = game.wager,
                    "disconnect abandoned game without settlement"
                );
            }
            info!(player = %id.short_hex(), "player unregistered");
        }
    }

    /// Number of connected players.
    pub async fn player_count(&self) -> usize {
        self.slots.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
