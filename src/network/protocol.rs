//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. All
//! messages are JSON with a kebab-case `type` tag matching the action
//! names (`get-game-config`, `bet`, ...). Replies reuse the snapshot
//! shape from the state machine; balance pushes are a separate message so
//! a client can update its wallet widget independently of the game view.

use serde::{Deserialize, Serialize};

use crate::game::difficulty::DifficultyCatalog;
use crate::game::session::GameSnapshot;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Attach a verified identity to the connection.
    #[serde(rename_all = "camelCase")]
    Auth {
        /// Externally issued JWT; omitted for guest play where allowed.
        token: Option<String>,
        /// Preferred display name for cosmetic feeds.
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Request the difficulty catalog and ladders.
    GetGameConfig,

    /// Request the current session snapshot (or null if none active).
    GetGameState,

    /// Place a wager and start a game.
    #[serde(rename_all = "camelCase")]
    Bet {
        /// Wager in major units.
        bet_amount: f64,
        /// Difficulty name.
        difficulty: String,
        /// Requested display currency.
        #[serde(default)]
        currency: Option<String>,
    },

    /// Advance one track position.
    Step,

    /// Cash out at the current multiplier.
    Withdraw,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp echoed back in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Authentication result.
    #[serde(rename_all = "camelCase")]
    AuthResult {
        /// Whether the identity was attached.
        success: bool,
        /// Attached player ID (UUID form) on success.
        player_id: Option<String>,
        /// Display name in effect for this connection.
        display_name: Option<String>,
        /// Failure description, if any.
        error: Option<String>,
        /// Server version string.
        server_version: String,
    },

    /// Difficulty catalog reply.
    GameConfig(GameConfig),

    /// Current session snapshot, or null when nothing is active.
    GameState {
        /// The live session view, if one exists.
        session: Option<GameSnapshot>,
    },

    /// Reply to `bet` / `step` / `withdraw`; also carries expected errors.
    Game(GameSnapshot),

    /// Unsolicited wallet update after every debit or credit.
    Balance {
        /// Wallet currency code.
        currency: String,
        /// Balance as a fixed two-decimal string.
        balance: String,
    },

    /// Pong response.
    #[serde(rename_all = "camelCase")]
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall-clock milliseconds.
        server_time: u64,
    },

    /// Connection-level error (for example acting before auth).
    Error {
        /// Human-readable message.
        message: String,
    },

    /// Server is shutting down.
    Shutdown {
        /// Reason string.
        reason: String,
    },
}

/// Catalog reply for `get-game-config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// All playable difficulties with their ladders and risk curves.
    pub difficulties: Vec<DifficultyConfig>,
    /// Cosmetic sample of recent winners.
    pub last_winners: Vec<LastWinner>,
}

/// One difficulty entry of the catalog reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyConfig {
    /// Difficulty name.
    pub name: String,
    /// Track length.
    pub total_lines: u32,
    /// Crash probability at the first step.
    pub base_crash_chance: f64,
    /// Linear growth of the crash probability per step.
    pub crash_chance_increase: f64,
    /// Cap for the crash probability.
    pub max_crash_chance: f64,
    /// Payout multiplier per step.
    pub multipliers: Vec<f64>,
}

/// Cosmetic recent-winner entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastWinner {
    /// Winner display name.
    pub display_name: String,
    /// Difficulty the win was on.
    pub difficulty: String,
    /// Cash-out multiplier.
    pub coeff: f64,
    /// Settled amount as a fixed two-decimal string.
    pub win_amount: String,
    /// Display currency.
    pub currency: String,
}

impl GameConfig {
    /// Build the catalog reply from the shared difficulty table.
    ///
    /// The winner list is a static sample; live feed generation is handled
    /// outside the game core.
    pub fn current() -> Self {
        let difficulties = DifficultyCatalog::global()
            .profiles()
            .map(|profile| DifficultyConfig {
                name: profile.difficulty.name().to_string(),
                total_lines: profile.total_steps,
                base_crash_chance: profile.base_crash_probability,
                crash_chance_increase: profile.probability_increase_per_step,
                max_crash_chance: profile.max_crash_probability,
                multipliers: profile
                    .multiplier_ladder
                    .iter()
                    .map(|&coeff| coeff as f64 / 100.0)
                    .collect(),
            })
            .collect();

        let last_winners = vec![
            LastWinner {
                display_name: "lucky_fox".into(),
                difficulty: "hard".into(),
                coeff: 4.27,
                win_amount: "85.40".into(),
                currency: "USD".into(),
            },
            LastWinner {
                display_name: "steady_hand".into(),
                difficulty: "easy".into(),
                coeff: 1.35,
                win_amount: "13.50".into(),
                currency: "USD".into(),
            },
            LastWinner {
                display_name: "edge_walker".into(),
                difficulty: "daredevil".into(),
                coeff: 9.80,
                win_amount: "196.00".into(),
                currency: "USD".into(),
            },
        ];

        Self {
            difficulties,
            last_winners,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
