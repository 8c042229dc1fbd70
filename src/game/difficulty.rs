//! Difficulty Catalog
//!
//! Static per-difficulty parameters: track length, crash-probability curve,
//! and the payout multiplier ladder. Profiles are built once at first use
//! and shared read-only by every session; a session never copies a profile.
//!
//! The ladder is derived from the probability curve as the cumulative
//! inverse survival product `m_k = prod(1 / (1 - p(s)))` rounded to
//! hundredths, which keeps payouts actuarially aligned with the risk the
//! player accepted at each step.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::GameError;

/// Multiplier expressed in hundredths (101 == 1.01x).
pub type CoeffHundredths = u32;

/// The 1.00x baseline before any step is taken.
pub const COEFF_BASELINE: CoeffHundredths = 100;

/// Named difficulty tier.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Long track, gentle risk curve.
    #[default]
    Easy,
    /// Medium track and curve.
    Medium,
    /// Short track, steep curve.
    Hard,
    /// Shortest track, steepest curve and biggest multipliers.
    Daredevil,
}

impl Difficulty {
    /// Every catalogued difficulty, in ascending risk order.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Daredevil,
    ];

    /// Wire name of this difficulty.
    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Daredevil => "daredevil",
        }
    }

    /// Parse a wire name, case-insensitively.
    pub fn parse(name: &str) -> Result<Self, GameError> {
        match name.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "daredevil" => Ok(Difficulty::Daredevil),
            _ => Err(GameError::UnknownDifficulty),
        }
    }
}

/// Immutable parameters for one difficulty tier.
#[derive(Debug, Clone, Serialize)]
pub struct DifficultyProfile {
    /// Which tier this profile describes.
    pub difficulty: Difficulty,
    /// Number of track positions ("lines") the player can advance through.
    pub total_steps: u32,
    /// Crash probability at the first step.
    pub base_crash_probability: f64,
    /// Upper bound for the crash probability at any step.
    pub max_crash_probability: f64,
    /// Linear growth of the crash probability per step.
    pub probability_increase_per_step: f64,
    /// Payout multiplier per step, in hundredths, strictly increasing.
    /// `multiplier_ladder[0]` is the payout after the first step.
    pub multiplier_ladder: Vec<CoeffHundredths>,
}

impl DifficultyProfile {
    fn build(
        difficulty: Difficulty,
        total_steps: u32,
        base: f64,
        increase: f64,
        max: f64,
    ) -> Self {
        debug_assert!(base > 0.0 && base <= max && max <= 1.0);

        let mut ladder = Vec::with_capacity(total_steps as usize);
        let mut running = 1.0f64;
        let mut prev = COEFF_BASELINE;
        for step in 1..=total_steps {
            let p = (base + (step - 1) as f64 * increase).min(max);
            running /= 1.0 - p;
            let mut coeff = (running * 100.0).round() as CoeffHundredths;
            // Rounding must never produce a flat or descending rung.
            if coeff <= prev {
                coeff = prev + 1;
            }
            ladder.push(coeff);
            prev = coeff;
        }

        Self {
            difficulty,
            total_steps,
            base_crash_probability: base,
            max_crash_probability: max,
            probability_increase_per_step: increase,
            multiplier_ladder: ladder,
        }
    }

    /// Crash probability at 1-based track position `step`.
    ///
    /// Positions beyond the track carry no crash risk: a player who cleared
    /// the whole track is always offered a safe cash-out.
    pub fn crash_probability(&self, step: u32) -> f64 {
        if step == 0 || step > self.total_steps {
            return 0.0;
        }
        (self.base_crash_probability
            + (step - 1) as f64 * self.probability_increase_per_step)
            .min(self.max_crash_probability)
    }

    /// Payout multiplier for a session at `current_step` moves taken
    /// (`-1` means no move yet and maps to the 1.00x baseline).
    pub fn multiplier_at(&self, current_step: i32) -> CoeffHundredths {
        if current_step < 0 {
            return COEFF_BASELINE;
        }
        let idx = (current_step as usize).min(self.multiplier_ladder.len() - 1);
        self.multiplier_ladder[idx]
    }

    /// Multiplier paid when the whole track is cleared.
    pub fn final_multiplier(&self) -> CoeffHundredths {
        *self
            .multiplier_ladder
            .last()
            .unwrap_or(&COEFF_BASELINE)
    }
}

/// Process-wide table of every difficulty profile.
pub struct DifficultyCatalog {
    profiles: BTreeMap<Difficulty, DifficultyProfile>,
}

impl DifficultyCatalog {
    fn build() -> Self {
        let mut profiles = BTreeMap::new();
        for (difficulty, steps, base, increase, max) in [
            (Difficulty::Easy, 30, 0.01, 0.01, 0.98),
            (Difficulty::Medium, 25, 0.03, 0.02, 0.98),
            (Difficulty::Hard, 20, 0.05, 0.04, 0.98),
            (Difficulty::Daredevil, 15, 0.10, 0.06, 0.98),
        ] {
            profiles.insert(
                difficulty,
                DifficultyProfile::build(difficulty, steps, base, increase, max),
            );
        }
        Self { profiles }
    }

    /// The shared catalog instance.
    pub fn global() -> &'static DifficultyCatalog {
        static CATALOG: OnceLock<DifficultyCatalog> = OnceLock::new();
        CATALOG.get_or_init(DifficultyCatalog::build)
    }

    /// Profile for a difficulty. Every `Difficulty` variant is catalogued.
    pub fn profile(&self, difficulty: Difficulty) -> &DifficultyProfile {
        &self.profiles[&difficulty]
    }

    /// All profiles, in ascending risk order.
    pub fn profiles(&self) -> impl Iterator<Item = &DifficultyProfile> {
        self.profiles.values()
    }
}

// =============================================================================
// TESTS
// =============================================================================
