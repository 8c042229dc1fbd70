//! # Crashline Game Server
//!
//! Authoritative server for a stepwise crash betting game: the player
//! wagers, advances along a track of multiplier steps, and cashes out
//! before hitting a precommitted crash step.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRASHLINE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/             - Game logic (transport-free)             │
//! │  ├── difficulty.rs - Risk curves and multiplier ladders      │
//! │  ├── outcome.rs    - Seeded crash-step commitment            │
//! │  ├── ledger.rs     - Player identity and integer wallet      │
//! │  ├── session.rs    - Single-game state machine               │
//! │  └── registry.rs   - Per-player slots, one lock each         │
//! │                                                              │
//! │  network/          - Networking                              │
//! │  ├── server.rs     - WebSocket accept loop and connections   │
//! │  ├── protocol.rs   - JSON message types                      │
//! │  ├── dispatcher.rs - Action routing and balance pushes       │
//! │  └── auth.rs       - JWT validation and guest identities     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settlement Guarantees
//!
//! The `game/` module keeps money exact and races impossible:
//! - All amounts are integer minor units; multipliers are integer
//!   hundredths. No float ever touches a balance.
//! - The crash step is committed at bet time and never re-rolled.
//! - Every wallet mutation for a player happens under that player's own
//!   slot lock, so a game can never be settled twice.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::difficulty::{Difficulty, DifficultyCatalog, DifficultyProfile};
pub use game::ledger::{Cents, Player, PlayerId};
pub use game::outcome::{LcgOutcome, OutcomeSource};
pub use game::registry::SessionRegistry;
pub use game::session::{GameSession, GameSnapshot};
pub use game::GameError;
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
