//! Game State Machine
//!
//! One active game per player: `CREATED -> active -> FINISHED(won|lost)`.
//! Terminal states are absorbing. The crash position is committed at
//! creation and never recomputed; step calls only reveal it.
//!
//! Money invariant: for any session,
//! `balance_after = balance_before - wager + (won ? wager * coeff / 100 : 0)`.
//! The wager is debited in `create` and the payout credited in `step`
//! (track cleared) or `withdraw`; no other code touches the wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::difficulty::{
    CoeffHundredths, Difficulty, DifficultyCatalog, DifficultyProfile, COEFF_BASELINE,
};
use super::ledger::{format_amount, Cents, Player, PlayerId};
use super::outcome::OutcomeSource;
use super::GameError;

/// Result of advancing one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Still on the track; cash-out remains available.
    Active,
    /// Hit the committed crash position. Wager lost.
    Crashed,
    /// Cleared the whole track without crashing. Paid the final multiplier.
    ClearedTrack,
}

/// One player's game, from bet to finish.
#[derive(Debug, Clone)]
pub struct GameSession {
    /// Unique session identifier.
    pub id: Uuid,
    /// Owning player.
    pub player_id: PlayerId,
    /// Wager debited at creation, in minor units.
    pub wager: Cents,
    /// Display currency of the wager.
    pub currency: String,
    /// Difficulty this session plays under.
    pub difficulty: Difficulty,
    /// Moves taken so far; `-1` means before the first move.
    pub current_step: i32,
    /// Committed crash position in `[1, total_steps + 1]`. Fixed at
    /// creation; `total_steps + 1` never crashes within the track.
    crash_step: u32,
    /// Whether a terminal state was reached.
    pub finished: bool,
    /// Whether the terminal state is a win.
    pub won: bool,
    /// When the bet was placed.
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    /// Place a bet: debit the wager and commit the crash position.
    ///
    /// On `InsufficientBalance` or `InvalidWager` the wallet is untouched.
    pub fn create(
        player: &mut Player,
        wager: Cents,
        difficulty: Difficulty,
        outcome: &mut dyn OutcomeSource,
    ) -> Result<Self, GameError> {
        if wager == 0 {
            return Err(GameError::InvalidWager);
        }
        player.debit(wager)?;

        let profile = DifficultyCatalog::global().profile(difficulty);
        let crash_step = outcome.crash_step(profile);
        debug_assert!((1..=profile.total_steps + 1).contains(&crash_step));

        Ok(Self {
            id: Uuid::new_v4(),
            player_id: player.id,
            wager,
            currency: player.currency.clone(),
            difficulty,
            current_step: -1,
            crash_step,
            finished: false,
            won: false,
            created_at: Utc::now(),
        })
    }

    /// Advance one track position and reveal whether it crashes.
    ///
    /// Clearing the final position settles the win against the wallet.
    pub fn step(&mut self, player: &mut Player) -> Result<StepOutcome, GameError> {
        if self.finished {
            return Err(GameError::AlreadyFinished);
        }

        self.current_step += 1;
        let position = (self.current_step + 1) as u32;
        let profile = self.profile();

        if position >= self.crash_step {
            self.finished = true;
            self.won = false;
            return Ok(StepOutcome::Crashed);
        }

        if position >= profile.total_steps {
            self.finished = true;
            self.won = true;
            player.credit(self.payout());
            return Ok(StepOutcome::ClearedTrack);
        }

        Ok(StepOutcome::Active)
    }

    /// Cash out at the current multiplier and settle against the wallet.
    ///
    /// Requires at least one step taken; the wager itself was already
    /// debited at creation, so only the payout is credited here.
    pub fn withdraw(&mut self, player: &mut Player) -> Result<Cents, GameError> {
        if self.finished {
            return Err(GameError::AlreadyFinished);
        }
        if self.current_step < 0 {
            return Err(GameError::NoMovesYet);
        }

        self.finished = true;
        self.won = true;
        let amount = self.payout();
        player.credit(amount);
        Ok(amount)
    }

    /// Current payout multiplier in hundredths.
    pub fn coeff(&self) -> CoeffHundredths {
        self.profile().multiplier_at(self.current_step)
    }

    /// Payout at the current multiplier, in minor units.
    pub fn payout(&self) -> Cents {
        (self.wager as u128 * self.coeff() as u128 / 100) as Cents
    }

    /// The committed crash position. Only meaningful to reveal once finished.
    pub fn crash_step(&self) -> u32 {
        self.crash_step
    }

    /// Pure read of the renderable session state; identical shape for
    /// "just acted" and "resume" cases. Never reveals the crash position
    /// while the session is active.
    pub fn snapshot(&self) -> GameSnapshot {
        let profile = self.profile();
        let win_amount = if self.finished && !self.won {
            0
        } else {
            self.payout()
        };
        let next_position = (self.current_step + 2) as u32;
        let next_crash_chance = if self.finished {
            0.0
        } else {
            profile.crash_probability(next_position)
        };

        GameSnapshot {
            session_id: self.id.to_string(),
            is_finished: self.finished,
            is_win: self.won,
            currency: self.currency.clone(),
            bet_amount: format_amount(self.wager),
            coeff: self.coeff() as f64 / 100.0,
            win_amount: format_amount(win_amount),
            difficulty: self.difficulty.name().to_string(),
            line_number: self.current_step,
            total_lines: profile.total_steps,
            crash_line: self.finished.then_some(self.crash_step),
            next_crash_chance,
            error: None,
        }
    }

    fn profile(&self) -> &'static DifficultyProfile {
        DifficultyCatalog::global().profile(self.difficulty)
    }
}

/// Renderable view of a session, as sent on the wire.
///
/// Error replies reuse the same shape with placeholder values so clients
/// never have to special-case a missing-fields response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Session identifier, or empty for placeholder snapshots.
    pub session_id: String,
    /// Whether the session reached a terminal state.
    pub is_finished: bool,
    /// Whether the terminal state is a win.
    pub is_win: bool,
    /// Display currency.
    pub currency: String,
    /// Wager as a fixed two-decimal string.
    pub bet_amount: String,
    /// Current payout multiplier.
    pub coeff: f64,
    /// Provisional cash-out value while active; settled value once
    /// finished (zero on a loss). Fixed two-decimal string.
    pub win_amount: String,
    /// Difficulty name.
    pub difficulty: String,
    /// Moves taken; `-1` before the first move.
    pub line_number: i32,
    /// Track length for this difficulty.
    pub total_lines: u32,
    /// Committed crash position, revealed only once finished.
    pub crash_line: Option<u32>,
    /// Crash probability of the next step, for UI feedback.
    pub next_crash_chance: f64,
    /// Expected-failure description, if this snapshot reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GameSnapshot {
    /// Safe placeholder snapshot carrying an error, with zeroed amounts and
    /// the default difficulty.
    pub fn fallback(currency: &str, error: impl Into<String>) -> Self {
        Self {
            session_id: String::new(),
            is_finished: false,
            is_win: false,
            currency: currency.to_string(),
            bet_amount: format_amount(0),
            coeff: COEFF_BASELINE as f64 / 100.0,
            win_amount: format_amount(0),
            difficulty: Difficulty::default().name().to_string(),
            line_number: -1,
            total_lines: 0,
            crash_line: None,
            next_crash_chance: 0.0,
            error: Some(error.into()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::outcome::FixedOutcome;
    use proptest::prelude::*;

    fn test_player(balance: Cents) -> Player {
        Player::new(
            PlayerId::new([7; 16]),
            "tester".into(),
            balance,
            "USD".into(),
        )
    }

    fn easy_ladder(idx: usize) -> CoeffHundredths {
        DifficultyCatalog::global()
            .profile(Difficulty::Easy)
            .multiplier_ladder[idx]
    }

    #[test]
    fn test_create_debits_wager() {
        let mut player = test_player(1_000);
        let session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(3),
        )
        .unwrap();

        assert_eq!(player.balance(), 900);
        assert_eq!(session.current_step, -1);
        assert!(!session.finished);
        assert_eq!(session.coeff(), COEFF_BASELINE);
    }

    #[test]
    fn test_create_zero_wager_rejected() {
        let mut player = test_player(1_000);
        let result =
            GameSession::create(&mut player, 0, Difficulty::Easy, &mut FixedOutcome(3));
        assert_eq!(result.unwrap_err(), GameError::InvalidWager);
        assert_eq!(player.balance(), 1_000);
    }

    #[test]
    fn test_create_insufficient_balance_untouched() {
        let mut player = test_player(50);
        let result =
            GameSession::create(&mut player, 100, Difficulty::Easy, &mut FixedOutcome(3));
        assert_eq!(result.unwrap_err(), GameError::InsufficientBalance);
        assert_eq!(player.balance(), 50);
    }

    #[test]
    fn test_crash_on_third_step() {
        // Wager 1.00 on easy with a committed crash at position 3: two
        // active steps with rising multipliers, third step loses.
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(3),
        )
        .unwrap();

        assert_eq!(session.step(&mut player).unwrap(), StepOutcome::Active);
        let first = session.snapshot();
        assert!(!first.is_finished);
        assert_eq!(first.coeff, easy_ladder(0) as f64 / 100.0);
        assert!(first.crash_line.is_none());

        assert_eq!(session.step(&mut player).unwrap(), StepOutcome::Active);
        let second = session.snapshot();
        assert!(second.coeff > first.coeff);

        assert_eq!(session.step(&mut player).unwrap(), StepOutcome::Crashed);
        let last = session.snapshot();
        assert!(last.is_finished);
        assert!(!last.is_win);
        assert_eq!(last.win_amount, "0.00");
        assert_eq!(last.crash_line, Some(3));
        // Loss: wager stays debited, nothing credited.
        assert_eq!(player.balance(), 900);
    }

    #[test]
    fn test_withdraw_after_two_steps() {
        // Wager 2.00, crash at 5, cash out after 2 steps at ladder[1].
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            200,
            Difficulty::Easy,
            &mut FixedOutcome(5),
        )
        .unwrap();

        session.step(&mut player).unwrap();
        session.step(&mut player).unwrap();
        let payout = session.withdraw(&mut player).unwrap();

        let expected = 200 * easy_ladder(1) as u64 / 100;
        assert_eq!(payout, expected);
        assert_eq!(player.balance(), 1_000 - 200 + expected);

        let snap = session.snapshot();
        assert!(snap.is_finished);
        assert!(snap.is_win);
        assert_eq!(snap.win_amount, format_amount(expected));
    }

    #[test]
    fn test_withdraw_before_first_step() {
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(5),
        )
        .unwrap();

        assert_eq!(
            session.withdraw(&mut player).unwrap_err(),
            GameError::NoMovesYet
        );
        assert!(!session.finished);
        assert_eq!(player.balance(), 900);
    }

    #[test]
    fn test_finished_session_absorbing() {
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(1),
        )
        .unwrap();

        assert_eq!(session.step(&mut player).unwrap(), StepOutcome::Crashed);
        assert_eq!(
            session.step(&mut player).unwrap_err(),
            GameError::AlreadyFinished
        );
        assert_eq!(
            session.withdraw(&mut player).unwrap_err(),
            GameError::AlreadyFinished
        );
        assert_eq!(player.balance(), 900);
    }

    #[test]
    fn test_track_exhaustion_wins_final_multiplier() {
        let profile = DifficultyCatalog::global().profile(Difficulty::Daredevil);
        let mut player = test_player(10_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Daredevil,
            &mut FixedOutcome(profile.total_steps + 1),
        )
        .unwrap();

        for _ in 0..profile.total_steps - 1 {
            assert_eq!(session.step(&mut player).unwrap(), StepOutcome::Active);
        }
        assert_eq!(
            session.step(&mut player).unwrap(),
            StepOutcome::ClearedTrack
        );

        assert!(session.won);
        assert_eq!(session.coeff(), profile.final_multiplier());
        let expected = 100 * profile.final_multiplier() as u64 / 100;
        assert_eq!(player.balance(), 10_000 - 100 + expected);
    }

    #[test]
    fn test_crash_step_fixed_across_steps() {
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(10),
        )
        .unwrap();

        let committed = session.crash_step();
        for _ in 0..5 {
            session.step(&mut player).unwrap();
            assert_eq!(session.crash_step(), committed);
        }
    }

    #[test]
    fn test_snapshot_hides_crash_while_active() {
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(10),
        )
        .unwrap();

        assert!(session.snapshot().crash_line.is_none());
        session.step(&mut player).unwrap();
        assert!(session.snapshot().crash_line.is_none());
    }

    #[test]
    fn test_snapshot_next_crash_chance() {
        let profile = DifficultyCatalog::global().profile(Difficulty::Easy);
        let mut player = test_player(1_000);
        let mut session = GameSession::create(
            &mut player,
            100,
            Difficulty::Easy,
            &mut FixedOutcome(30),
        )
        .unwrap();

        // Before the first move the next step is position 1.
        assert_eq!(
            session.snapshot().next_crash_chance,
            profile.crash_probability(1)
        );
        session.step(&mut player).unwrap();
        assert_eq!(
            session.snapshot().next_crash_chance,
            profile.crash_probability(2)
        );
    }

    #[test]
    fn test_fallback_snapshot_shape() {
        let snap = GameSnapshot::fallback("USD", "Insufficient balance");
        assert_eq!(snap.error.as_deref(), Some("Insufficient balance"));
        assert_eq!(snap.bet_amount, "0.00");
        assert_eq!(snap.win_amount, "0.00");
        assert_eq!(snap.coeff, 1.0);
        assert!(!snap.is_finished);
    }

    proptest! {
        // Money conservation: bet, step a random number of times, then
        // withdraw if still active. The wallet must end at exactly
        // balance - wager + payout, with payout zero on a loss.
        #[test]
        fn prop_money_conservation(
            crash in 1u32..=31,
            steps in 0usize..35,
            wager in 1u64..10_000,
        ) {
            let start = 1_000_000u64;
            let mut player = test_player(start);
            let mut session = GameSession::create(
                &mut player,
                wager,
                Difficulty::Easy,
                &mut FixedOutcome(crash),
            ).unwrap();

            for _ in 0..steps {
                if session.finished {
                    break;
                }
                session.step(&mut player).unwrap();
            }
            if !session.finished && session.current_step >= 0 {
                session.withdraw(&mut player).unwrap();
            }

            let payout = if session.finished && session.won {
                wager as u128 * session.coeff() as u128 / 100
            } else if session.finished {
                0
            } else {
                // Still active (no steps taken): wager remains debited.
                prop_assert_eq!(player.balance(), start - wager);
                return Ok(());
            };
            prop_assert_eq!(
                player.balance() as u128,
                start as u128 - wager as u128 + payout
            );
        }
    }
}
