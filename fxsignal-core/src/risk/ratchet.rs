//! Stop ratchet: a protective stop may tighten, never loosen.

use crate::domain::TradeDirection;

/// Tracks the best stop level seen so far for one position.
///
/// - Long: the level can only rise.
/// - Short: the level can only fall.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RatchetState {
    current_level: f64,
    direction: TradeDirection,
}

impl RatchetState {
    pub fn with_initial_level(direction: TradeDirection, initial_level: f64) -> Self {
        Self {
            current_level: initial_level,
            direction,
        }
    }

    /// Whether `proposed` is strictly more protective than the current level.
    pub fn would_tighten(&self, proposed: f64) -> bool {
        match self.direction {
            TradeDirection::Long => proposed > self.current_level,
            TradeDirection::Short => proposed < self.current_level,
        }
    }

    /// Apply a proposed level and return the ratcheted one.
    ///
    /// ```
    /// use fxsignal_core::domain::TradeDirection;
    /// use fxsignal_core::risk::RatchetState;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(TradeDirection::Long, 1.2650);
    /// assert_eq!(ratchet.apply(1.2700), 1.2700);
    /// assert_eq!(ratchet.apply(1.2600), 1.2700);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        self.current_level = match self.direction {
            TradeDirection::Long => self.current_level.max(proposed),
            TradeDirection::Short => self.current_level.min(proposed),
        };
        self.current_level
    }

    pub fn current_level(&self) -> f64 {
        self.current_level
    }

    pub fn direction(&self) -> TradeDirection {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_tightening_allowed() {
        let mut ratchet = RatchetState::with_initial_level(TradeDirection::Long, 1.2650);
        assert_eq!(ratchet.apply(1.2700), 1.2700);
        assert_eq!(ratchet.current_level(), 1.2700);
    }

    #[test]
    fn long_loosening_blocked() {
        let mut ratchet = RatchetState::with_initial_level(TradeDirection::Long, 1.2700);
        assert_eq!(ratchet.apply(1.2600), 1.2700);
        assert!(!ratchet.would_tighten(1.2600));
        assert!(!ratchet.would_tighten(1.2700));
    }

    #[test]
    fn short_tightening_allowed() {
        let mut ratchet = RatchetState::with_initial_level(TradeDirection::Short, 150.50);
        assert!(ratchet.would_tighten(150.00));
        assert_eq!(ratchet.apply(150.00), 150.00);
    }

    #[test]
    fn short_loosening_blocked() {
        let mut ratchet = RatchetState::with_initial_level(TradeDirection::Short, 150.00);
        assert_eq!(ratchet.apply(151.00), 150.00);
    }
}
