use std::cell::Cell;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::{SorrelError, WARN_TAG};

/// Per-thread budget on lazy-sequence realization steps. Dispatch itself
/// probes in O(required) and does not depend on this for termination; the
/// guard exists for full realization of unbounded sequences.
#[derive(Clone, Copy, Debug)]
pub struct GuardConfig {
    pub enabled: bool,
    pub soft_steps: u64,
    pub hard_steps: u64,
    pub check_mask: u64,
}

impl GuardConfig {
    pub fn normalized(mut self) -> Self {
        if self.hard_steps == 0 {
            self.enabled = false;
            self.soft_steps = 0;
            return self;
        }
        if self.soft_steps >= self.hard_steps {
            self.soft_steps = self.hard_steps.saturating_mul(3) / 4;
        }
        self
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            soft_steps: 6_000_000,
            hard_steps: 8_000_000,
            check_mask: 0x3ff,
        }
    }
}

static CONFIG: Lazy<RwLock<GuardConfig>> = Lazy::new(|| RwLock::new(GuardConfig::default()));

thread_local! {
    static STEPS: Cell<u64> = const { Cell::new(0) };
    static WARNED: Cell<bool> = const { Cell::new(false) };
}

pub fn install(config: GuardConfig) {
    let normalized = config.normalized();
    if let Ok(mut slot) = CONFIG.write() {
        *slot = normalized;
    }
    reset();
}

pub fn current() -> GuardConfig {
    CONFIG.read().map(|config| *config).unwrap_or_default()
}

/// Zeroes this thread's step counter and warning latch.
pub fn reset() {
    STEPS.with(|steps| steps.set(0));
    WARNED.with(|warned| warned.set(false));
}

/// Called once per traversal step. Only every `check_mask + 1`th step pays
/// for the config read and limit comparison.
pub fn tick() -> Result<(), SorrelError> {
    let steps = STEPS.with(|cell| {
        let next = cell.get().wrapping_add(1);
        cell.set(next);
        next
    });
    let config = match CONFIG.read() {
        Ok(config) => *config,
        Err(_) => return Ok(()),
    };
    if !config.enabled || steps & config.check_mask != 0 {
        return Ok(());
    }
    if steps > config.hard_steps {
        return Err(SorrelError::guard(format!(
            "sequence realization exceeded {} steps",
            config.hard_steps
        )));
    }
    if steps > config.soft_steps && !WARNED.with(|warned| warned.replace(true)) {
        eprintln!(
            "{} sequence realization passed {} steps",
            WARN_TAG, config.soft_steps
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_disables_on_zero_hard_budget() {
        let config = GuardConfig {
            enabled: true,
            soft_steps: 10,
            hard_steps: 0,
            check_mask: 0,
        }
        .normalized();
        assert!(!config.enabled);
        assert_eq!(config.soft_steps, 0);
    }

    #[test]
    fn normalized_pulls_soft_below_hard() {
        let config = GuardConfig {
            enabled: true,
            soft_steps: 100,
            hard_steps: 80,
            check_mask: 0,
        }
        .normalized();
        assert_eq!(config.soft_steps, 60);
    }

    #[test]
    fn disabled_guard_never_trips() {
        reset();
        for _ in 0..64 {
            tick().unwrap();
        }
    }

    #[test]
    fn current_config_is_normalized() {
        let config = current();
        assert!(config.soft_steps <= config.hard_steps);
    }
}
