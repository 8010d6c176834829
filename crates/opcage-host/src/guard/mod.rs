//! Per-invocation runtime guard: stack, array, and time budgets.
//!
//! A guard is constructed fresh for each guarded invocation, is exclusively
//! owned by that invocation's call stack, and dies with it; no invocation
//! ever observes another's counters. The time budget is cooperative: it is
//! polled at rewriter-inserted checkpoints, so a host that needs a hard
//! ceiling should layer an external watchdog on top.

use std::time::{Duration, Instant};

use opcage_core::error::{OpcageError, Result};

/// Budgets consumed at guard construction time.
#[derive(Debug, Clone)]
pub struct RuntimeGuardSettings {
    pub stack_bytes_limit: u64,
    pub array_length_limit: u64,
    pub time_limit: Duration,
}

impl Default for RuntimeGuardSettings {
    fn default() -> Self {
        Self {
            stack_bytes_limit: 1024,
            array_length_limit: 100,
            time_limit: Duration::from_millis(500),
        }
    }
}

/// Budget monitor for one guarded invocation.
#[derive(Debug)]
pub struct RuntimeGuard {
    settings: RuntimeGuardSettings,
    stack_bytes: u64,
    started: Instant,
}

impl RuntimeGuard {
    pub fn new(settings: RuntimeGuardSettings) -> Self {
        Self {
            settings,
            stack_bytes: 0,
            started: Instant::now(),
        }
    }

    /// Method-entry checkpoint: polls the time budget, then charges the
    /// frame estimate. Reaching exactly the limit is within budget.
    pub fn enter_frame(&mut self, frame_bytes: u32) -> Result<()> {
        self.check_time()?;
        self.stack_bytes += u64::from(frame_bytes);
        if self.stack_bytes > self.settings.stack_bytes_limit {
            return Err(OpcageError::StackBudget {
                used: self.stack_bytes,
                limit: self.settings.stack_bytes_limit,
            });
        }
        Ok(())
    }

    /// Releases a frame charged by [`RuntimeGuard::enter_frame`].
    pub fn exit_frame(&mut self, frame_bytes: u32) {
        self.stack_bytes = self.stack_bytes.saturating_sub(u64::from(frame_bytes));
    }

    /// Cooperative time-budget poll, measured from guard construction.
    pub fn check_time(&self) -> Result<()> {
        if self.started.elapsed() > self.settings.time_limit {
            return Err(OpcageError::TimeBudget {
                limit_ms: self.settings.time_limit.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Array-allocation check. Requesting exactly the limit is within
    /// budget.
    pub fn check_array_length(&self, requested: u64) -> Result<()> {
        if requested > self.settings.array_length_limit {
            return Err(OpcageError::ArrayBudget {
                requested,
                limit: self.settings.array_length_limit,
            });
        }
        Ok(())
    }

    /// Currently charged stack bytes.
    pub fn stack_bytes(&self) -> u64 {
        self.stack_bytes
    }
}
