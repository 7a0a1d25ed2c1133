//! Reward Functions
//!
//! Reward constants and the pure decision rules that score an interval
//! adjustment against the observed temperature delta.

use serde::{Deserialize, Serialize};

use crate::config::EnvironmentConfig;
use crate::rl::core::action::Action;

/// Fixed reward constants
///
/// `WithinBounds`/`DoNothing`/`OutOfBounds` score the delta itself,
/// `CorrectAction`/`IncorrectAction` score the direction the policy chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reward {
    WithinBounds,
    DoNothing,
    OutOfBounds,
    CorrectAction,
    IncorrectAction,
}

impl Reward {
    /// Scalar payload of the reward
    pub const fn value(self) -> f32 {
        match self {
            Reward::WithinBounds => 1.0,
            Reward::DoNothing => 0.0,
            Reward::OutOfBounds => -2.0,
            Reward::CorrectAction => 1.0,
            Reward::IncorrectAction => -2.0,
        }
    }

    pub fn is_positive(self) -> bool {
        self.value() > 0.0
    }

    pub fn is_negative(self) -> bool {
        self.value() < 0.0
    }
}

impl std::fmt::Display for Reward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:+})", self, self.value())
    }
}

/// Default band below the boundary in which the interval is left alone
pub const DEFAULT_COMFORT_MARGIN: f64 = 0.7;

/// Default margin below the boundary required before the interval may grow
pub const DEFAULT_GROWTH_MARGIN: f64 = 0.5;

/// Stateless reward shaping rules for one boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardPolicy {
    pub boundary: f64,
    pub comfort_margin: f64,
    pub growth_margin: f64,
}

impl RewardPolicy {
    /// Create with the default margins
    pub fn new(boundary: f64) -> Self {
        Self {
            boundary,
            comfort_margin: DEFAULT_COMFORT_MARGIN,
            growth_margin: DEFAULT_GROWTH_MARGIN,
        }
    }

    pub fn from_config(config: &EnvironmentConfig) -> Self {
        Self {
            boundary: config.boundary,
            comfort_margin: config.comfort_margin,
            growth_margin: config.growth_margin,
        }
    }

    /// Decide whether the interval needs adjusting for this delta
    ///
    /// Returns `(adjust, reward)`.
    pub fn needs_adjustment(&self, delta: f64) -> (bool, Reward) {
        let delta = delta.abs();

        if delta >= self.boundary {
            // out of safe bounds, the interval has to shrink
            (true, Reward::OutOfBounds)
        } else if delta + self.comfort_margin >= self.boundary {
            (false, Reward::DoNothing)
        } else if delta < self.boundary - self.growth_margin {
            // enough headroom to report less often
            (true, Reward::WithinBounds)
        } else {
            (false, Reward::DoNothing)
        }
    }

    /// Re-score a tentative interval change
    ///
    /// Rules are checked in order and the first match wins. Returns
    /// `(final_reward, final_interval)`.
    pub fn evaluate_adjustment(
        &self,
        delta: f64,
        new_interval: u32,
        old_interval: u32,
        proposed: Reward,
    ) -> (Reward, u32) {
        if new_interval < old_interval && proposed.is_negative() {
            return (Reward::CorrectAction, new_interval);
        }

        // room to grow, but the policy did not
        if proposed.is_positive() && new_interval <= old_interval {
            return (Reward::IncorrectAction, new_interval);
        }

        // grew while out of bounds: punish and step back down
        if new_interval > old_interval && delta > self.boundary {
            let corrected = if old_interval > 1 {
                old_interval - 1
            } else {
                old_interval
            };
            return (Reward::IncorrectAction, corrected);
        }

        if new_interval < old_interval && delta > self.boundary {
            return (Reward::CorrectAction, new_interval);
        }

        if delta < self.boundary - self.growth_margin && new_interval == old_interval {
            return (Reward::IncorrectAction, new_interval + 1);
        }

        (proposed, new_interval)
    }

    /// Score an action taken at `interval` for this delta
    ///
    /// Returns `(reward, interval_after)`.
    pub fn score(&self, delta: f64, action: Action, interval: u32) -> (Reward, u32) {
        let (adjust, proposed) = self.needs_adjustment(delta);
        if !adjust {
            return (proposed, interval);
        }

        let tentative = map_action_to_interval(action, interval);
        let (reward, next) = self.evaluate_adjustment(delta, tentative, interval, proposed);
        (reward, next.max(1))
    }
}

/// Apply an action to a send interval, never going below one minute
pub fn map_action_to_interval(action: Action, interval: u32) -> u32 {
    match action {
        Action::DecreaseInterval if interval > 1 => interval - 1,
        Action::IncreaseInterval => interval.saturating_add(1),
        _ => interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_values() {
        assert_eq!(Reward::WithinBounds.value(), 1.0);
        assert_eq!(Reward::DoNothing.value(), 0.0);
        assert_eq!(Reward::OutOfBounds.value(), -2.0);
        assert_eq!(Reward::CorrectAction.value(), 1.0);
        assert_eq!(Reward::IncorrectAction.value(), -2.0);
    }

    #[test]
    fn test_needs_adjustment_table() {
        let policy = RewardPolicy::new(2.0);

        assert_eq!(policy.needs_adjustment(2.0), (true, Reward::OutOfBounds));
        assert_eq!(policy.needs_adjustment(1.0), (true, Reward::WithinBounds));
        assert_eq!(policy.needs_adjustment(1.3), (false, Reward::DoNothing));
        assert_eq!(policy.needs_adjustment(1.5), (false, Reward::DoNothing));
    }

    #[test]
    fn test_out_of_bounds_for_any_delta_at_or_above_boundary() {
        for boundary in [0.5, 1.0, 2.0, 3.0, 10.0] {
            let policy = RewardPolicy::new(boundary);
            for extra in [0.0, 0.01, 0.5, 1.0, 100.0] {
                assert_eq!(
                    policy.needs_adjustment(boundary + extra),
                    (true, Reward::OutOfBounds)
                );
            }
        }
    }

    #[test]
    fn test_near_boundary_band_does_nothing() {
        let policy = RewardPolicy::new(3.0);
        let mut delta = 2.5;
        while delta < 3.0 {
            assert_eq!(policy.needs_adjustment(delta), (false, Reward::DoNothing));
            delta += 0.05;
        }
    }

    #[test]
    fn test_score_at_rest() {
        let policy = RewardPolicy::new(3.0);

        // zero delta leaves room to grow; holding still is punished
        assert_eq!(policy.score(0.0, Action::NoOp, 4), (Reward::IncorrectAction, 4));
        assert_eq!(
            policy.score(0.0, Action::IncreaseInterval, 4),
            (Reward::WithinBounds, 5)
        );
        assert_eq!(policy.score(2.6, Action::IncreaseInterval, 4), (Reward::DoNothing, 4));
        assert_eq!(
            policy.score(5.0, Action::DecreaseInterval, 4),
            (Reward::CorrectAction, 3)
        );
    }

    #[test]
    fn test_map_action_to_interval() {
        assert_eq!(map_action_to_interval(Action::NoOp, 5), 5);
        assert_eq!(map_action_to_interval(Action::DecreaseInterval, 5), 4);
        assert_eq!(map_action_to_interval(Action::IncreaseInterval, 5), 6);
        assert_eq!(map_action_to_interval(Action::DecreaseInterval, 1), 1);
        for n in 1..50 {
            assert_eq!(map_action_to_interval(Action::IncreaseInterval, n), n + 1);
        }
    }

    #[test]
    fn test_shrink_corrects_out_of_bounds() {
        let policy = RewardPolicy::new(2.0);
        assert_eq!(
            policy.evaluate_adjustment(2.0, 4, 5, Reward::OutOfBounds),
            (Reward::CorrectAction, 4)
        );
    }

    #[test]
    fn test_failure_to_grow_is_punished() {
        let policy = RewardPolicy::new(3.0);
        assert_eq!(
            policy.evaluate_adjustment(0.5, 5, 5, Reward::WithinBounds),
            (Reward::IncorrectAction, 5)
        );
        assert_eq!(
            policy.evaluate_adjustment(0.5, 4, 5, Reward::WithinBounds),
            (Reward::IncorrectAction, 4)
        );
    }

    #[test]
    fn test_growth_while_out_of_bounds_steps_back() {
        let policy = RewardPolicy::new(2.0);
        assert_eq!(
            policy.evaluate_adjustment(5.0, 6, 5, Reward::OutOfBounds),
            (Reward::IncorrectAction, 4)
        );
        // clamped at the one-minute floor
        assert_eq!(
            policy.evaluate_adjustment(5.0, 2, 1, Reward::OutOfBounds),
            (Reward::IncorrectAction, 1)
        );
    }

    #[test]
    fn test_shrink_with_non_negative_proposal_and_large_delta() {
        let policy = RewardPolicy::new(2.0);
        assert_eq!(
            policy.evaluate_adjustment(5.0, 4, 5, Reward::DoNothing),
            (Reward::CorrectAction, 4)
        );
    }

    #[test]
    fn test_idle_with_headroom_is_forced_to_grow() {
        let policy = RewardPolicy::new(3.0);
        assert_eq!(
            policy.evaluate_adjustment(0.5, 5, 5, Reward::DoNothing),
            (Reward::IncorrectAction, 6)
        );
    }

    #[test]
    fn test_fallthrough_keeps_proposal() {
        let policy = RewardPolicy::new(2.0);
        // out of bounds and the policy did nothing at the floor
        assert_eq!(
            policy.evaluate_adjustment(2.0, 1, 1, Reward::OutOfBounds),
            (Reward::OutOfBounds, 1)
        );
    }
}
