//! Game Logic Module
//!
//! The per-player crash game: difficulty catalog, precommitted outcome
//! generation, wallet, state machine, and session registry. Everything in
//! here is pure in-memory computation; no I/O, no suspension points inside
//! a single operation.
//!
//! ## Module Structure
//!
//! - `difficulty`: Difficulty profiles and the payout multiplier ladder
//! - `outcome`: Crash-step precommitment (pluggable generator)
//! - `ledger`: Player identity and wallet
//! - `session`: Bet / step / withdraw state machine
//! - `registry`: One live session per player, per-player locking

pub mod difficulty;
pub mod ledger;
pub mod outcome;
pub mod registry;
pub mod session;

// Re-export key types
pub use difficulty::{Difficulty, DifficultyCatalog, DifficultyProfile};
pub use ledger::{Cents, Player, PlayerId};
pub use outcome::{FixedOutcome, LcgOutcome, OutcomeSource};
pub use registry::{PlayerSlot, SessionRegistry};
pub use session::{GameSession, GameSnapshot};

/// Expected user-facing game failures.
///
/// All variants are caught at the dispatcher boundary and converted into a
/// well-formed snapshot carrying an `error` string; none of them tears down
/// a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Requested difficulty name is not in the catalog.
    #[error("unknown difficulty")]
    UnknownDifficulty,

    /// Wager is zero or not a representable amount.
    #[error("invalid bet amount")]
    InvalidWager,

    /// Wallet balance is smaller than the requested wager.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Step or withdraw with no session pending.
    #[error("no active game session")]
    NoActiveSession,

    /// Operation on a session that already reached a terminal state.
    #[error("game session already finished")]
    AlreadyFinished,

    /// Withdraw before the first step.
    #[error("cannot cash out before the first step")]
    NoMovesYet,

    /// A new bet while a session is still live.
    #[error("a game session is already active")]
    GameAlreadyActive,
}
