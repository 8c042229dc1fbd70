//! Protocol Dispatcher
//!
//! Routes tagged game actions to the registry and state machine and shapes
//! the reply. Two channels per exchange: the synchronous reply carries game
//! state, and an independent push on the connection's outbound channel
//! carries wallet state after every debit or credit.
//!
//! Expected failures never tear anything down: they come back as a
//! well-formed snapshot with an `error` string and safe placeholder values.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::game::difficulty::Difficulty;
use crate::game::ledger::{cents_from_amount, format_amount, PlayerId};
use crate::game::outcome::LcgOutcome;
use crate::game::registry::SessionRegistry;
use crate::game::session::GameSnapshot;
use crate::game::GameError;
use crate::network::protocol::{ClientMessage, GameConfig, ServerMessage};

/// Routes actions for authenticated connections.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    default_currency: String,
}

impl Dispatcher {
    /// Create a dispatcher over the shared registry.
    pub fn new(registry: Arc<SessionRegistry>, default_currency: String) -> Self {
        Self {
            registry,
            default_currency,
        }
    }

    /// Handle one game action and return the reply, if the action yields
    /// one. Connection-level messages (`auth`, `ping`) are not routed here
    /// and produce no reply.
    pub async fn dispatch(
        &self,
        player_id: &PlayerId,
        message: ClientMessage,
        outbound: &mpsc::Sender<ServerMessage>,
    ) -> Option<ServerMessage> {
        match message {
            ClientMessage::GetGameConfig => {
                Some(ServerMessage::GameConfig(GameConfig::current()))
            }
            ClientMessage::GetGameState => Some(self.get_game_state(player_id).await),
            ClientMessage::Bet {
                bet_amount,
                difficulty,
                currency,
            } => Some(
                self.bet(player_id, bet_amount, &difficulty, currency.as_deref(), outbound)
                    .await,
            ),
            ClientMessage::Step => Some(self.step(player_id, outbound).await),
            ClientMessage::Withdraw => Some(self.withdraw(player_id, outbound).await),
            ClientMessage::Auth { .. } | ClientMessage::Ping { .. } => None,
        }
    }

    async fn get_game_state(&self, player_id: &PlayerId) -> ServerMessage {
        let session = match self.registry.slot(player_id).await {
            Some(slot) => slot.read().await.game_snapshot(),
            None => None,
        };
        ServerMessage::GameState { session }
    }

    async fn bet(
        &self,
        player_id: &PlayerId,
        bet_amount: f64,
        difficulty: &str,
        currency: Option<&str>,
        outbound: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        let slot = match self.registry.slot(player_id).await {
            Some(slot) => slot,
            None => return self.game_error(GameError::NoActiveSession, Operation::Bet),
        };

        let result = {
            let mut slot = slot.write().await;
            if let Some(requested) = currency {
                if requested != slot.player.currency {
                    // Exchange tables live outside the core; wagers settle
                    // in the wallet currency.
                    debug!(
                        player = %player_id.short_hex(),
                        requested,
                        wallet = %slot.player.currency,
                        "currency mismatch, using wallet currency"
                    );
                }
            }

            let outcome = cents_from_amount(bet_amount)
                .and_then(|wager| {
                    let difficulty = Difficulty::parse(difficulty)?;
                    slot.begin_game(
                        wager,
                        difficulty,
                        &mut LcgOutcome::for_player(player_id),
                    )
                });
            (outcome, slot.player.currency.clone(), slot.player.balance())
        };

        match result {
            (Ok(snapshot), currency, balance) => {
                self.push_balance(outbound, &currency, balance).await;
                ServerMessage::Game(snapshot)
            }
            (Err(err), currency, _) => {
                ServerMessage::Game(GameSnapshot::fallback(
                    &currency,
                    error_text(err, Operation::Bet),
                ))
            }
        }
    }

    async fn step(
        &self,
        player_id: &PlayerId,
        outbound: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        let slot = match self.registry.slot(player_id).await {
            Some(slot) => slot,
            None => return self.game_error(GameError::NoActiveSession, Operation::Step),
        };

        let (result, currency, balance) = {
            let mut slot = slot.write().await;
            (
                slot.step_game(),
                slot.player.currency.clone(),
                slot.player.balance(),
            )
        };

        match result {
            Ok((snapshot, balance_changed)) => {
                // The track-exhaustion auto-win settles inside step_game.
                if balance_changed {
                    self.push_balance(outbound, &currency, balance).await;
                }
                ServerMessage::Game(snapshot)
            }
            Err(err) => ServerMessage::Game(GameSnapshot::fallback(
                &currency,
                error_text(err, Operation::Step),
            )),
        }
    }

    async fn withdraw(
        &self,
        player_id: &PlayerId,
        outbound: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        let slot = match self.registry.slot(player_id).await {
            Some(slot) => slot,
            None => return self.game_error(GameError::NoActiveSession, Operation::Withdraw),
        };

        let (result, currency, balance) = {
            let mut slot = slot.write().await;
            (
                slot.withdraw_game(),
                slot.player.currency.clone(),
                slot.player.balance(),
            )
        };

        match result {
            Ok(snapshot) => {
                self.push_balance(outbound, &currency, balance).await;
                ServerMessage::Game(snapshot)
            }
            Err(err) => ServerMessage::Game(GameSnapshot::fallback(
                &currency,
                error_text(err, Operation::Withdraw),
            )),
        }
    }

    fn game_error(&self, err: GameError, op: Operation) -> ServerMessage {
        ServerMessage::Game(GameSnapshot::fallback(
            &self.default_currency,
            error_text(err, op),
        ))
    }

    async fn push_balance(
        &self,
        outbound: &mpsc::Sender<ServerMessage>,
        currency: &str,
        balance: crate::game::Cents,
    ) {
        let _ = outbound
            .send(ServerMessage::Balance {
                currency: currency.to_string(),
                balance: format_amount(balance),
            })
            .await;
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Bet,
    Step,
    Withdraw,
}

/// Client-facing wording for each expected failure.
fn error_text(err: GameError, op: Operation) -> &'static str {
    match err {
        GameError::UnknownDifficulty => "Unknown difficulty",
        GameError::InvalidWager => "Invalid bet amount",
        GameError::InsufficientBalance => "Insufficient balance",
        GameError::GameAlreadyActive => "Game already active",
        GameError::NoMovesYet => "Cannot withdraw before the first step",
        GameError::NoActiveSession | GameError::AlreadyFinished => match op {
            Operation::Withdraw => "No active game session found for withdrawal",
            _ => "No active game session found",
        },
    }
}

// =============================================================================
// TESTS
// =============================================================================
