//! Level arithmetic. Each level `n` needs `n * XP_PER_LEVEL` XP to clear,
//! with no cap on level.

use crate::errors::SideQuestError;

/// XP multiplier for the linear per-level threshold.
pub const XP_PER_LEVEL: u64 = 100;

/// Largest XP a single quest bonus, sidequest reward or award may carry.
pub const MAX_XP_VALUE: u64 = 1_000_000;

/// Reject XP values above [`MAX_XP_VALUE`].
pub fn check_xp_value(value: u64) -> Result<u64, SideQuestError> {
    if value > MAX_XP_VALUE {
        return Err(SideQuestError::XpOutOfRange {
            value,
            max: MAX_XP_VALUE,
        });
    }
    Ok(value)
}

/// XP needed to clear `level`.
pub fn threshold(level: u32) -> u64 {
    u64::from(level.max(1)) * XP_PER_LEVEL
}

/// Result of applying an award to a `(level, current_xp)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub previous_level: u32,
    pub level: u32,
    pub current_xp: u64,
    pub awarded: u64,
}

impl LevelChange {
    pub fn levels_gained(&self) -> u32 {
        self.level - self.previous_level
    }

    pub fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }
}

/// Add `amount` and normalize: while the pool covers the current level's
/// threshold, pay it and advance. Stops once `current_xp < threshold(level)`.
///
/// Fails instead of saturating when the pool or the level would overflow, so
/// no XP is ever dropped.
pub fn apply_xp(level: u32, current_xp: u64, amount: u64) -> Result<LevelChange, SideQuestError> {
    let previous_level = level.max(1);
    let mut level = previous_level;
    let mut xp = current_xp
        .checked_add(amount)
        .ok_or_else(|| SideQuestError::Internal(format!("xp overflow adding {} to {}", amount, current_xp)))?;
    while xp >= threshold(level) {
        xp -= threshold(level);
        level = level
            .checked_add(1)
            .ok_or_else(|| SideQuestError::Internal("level overflow".to_string()))?;
    }
    Ok(LevelChange {
        previous_level,
        level,
        current_xp: xp,
        awarded: amount,
    })
}

/// Fill fraction of the XP bar, clamped to `[0, 1]`.
pub fn progress_fraction(level: u32, current_xp: u64) -> f64 {
    (current_xp as f64 / threshold(level) as f64).min(1.0)
}
