//! Action Space
//!
//! The three interval adjustments a policy can choose between.

use serde::{Deserialize, Serialize};

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 3;

/// Discrete action applied to a device's send interval
///
/// Ordinals are part of the trainer interface and of exported models; never
/// reorder the variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    /// Leave the interval as it is
    #[default]
    NoOp = 0,
    /// Report more often (interval - 1 minute)
    DecreaseInterval = 1,
    /// Report less often (interval + 1 minute)
    IncreaseInterval = 2,
}

impl Action {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::NoOp),
            1 => Some(Self::DecreaseInterval),
            2 => Some(Self::IncreaseInterval),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::NoOp => write!(f, "NoOp"),
            Action::DecreaseInterval => write!(f, "DecreaseInterval"),
            Action::IncreaseInterval => write!(f, "IncreaseInterval"),
        }
    }
}
