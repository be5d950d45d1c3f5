//! Scratch pool configuration.

use strata_arena::ArenaError;

/// Sizing for a scratch pool's slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScratchConfig {
    /// Bytes per slot. `0` disables scratch arenas for the pool.
    ///
    /// Default: 65_536.
    pub slot_size: usize,

    /// Mark capacity of each slot, which bounds acquire nesting depth
    /// on a single slot.
    ///
    /// Default: 32.
    pub max_marks: usize,
}

impl ScratchConfig {
    /// Default slot size: 64 KiB.
    pub const DEFAULT_SLOT_SIZE: usize = 64 * 1024;

    /// Default marks per slot.
    pub const DEFAULT_MAX_MARKS: usize = 32;

    /// Create a config with the given slot size and the default mark depth.
    pub fn new(slot_size: usize) -> Self {
        Self {
            slot_size,
            max_marks: Self::DEFAULT_MAX_MARKS,
        }
    }

    /// A config that builds a disabled pool.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Whether pools built from this config hand out arenas.
    pub fn is_enabled(&self) -> bool {
        self.slot_size != 0
    }

    /// Check the parameters before building a pool.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.is_enabled() && self.max_marks == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "scratch max_marks must be non-zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLOT_SIZE)
    }
}
