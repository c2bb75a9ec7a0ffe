//! Wake-up timing of the scheduler's step sleeps.
//!
//! Each step sleeps until `step_start + interval`. Waking after that
//! deadline pushes every later step back by the same amount, so the
//! scheduler records how late each wake was and how much of the step
//! interval that lateness ate.

use std::time::Duration;

use serde::Serialize;

/// Timing of the steps recorded since the last [`StepTelemetry::take_summary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySummary {
    pub steps: u32,
    pub mean_late_us: u32,
    pub worst_late_us: u32,
    /// Worst lateness as a share of its own step interval, in per mille.
    pub worst_share_permille: u32,
    /// Steps in this window that woke later than the budget.
    pub overruns: u32,
    /// Overruns since the scheduler was created.
    pub total_overruns: u64,
}

#[derive(Default)]
struct Window {
    steps: u32,
    late_sum_us: u64,
    worst_late_us: u32,
    worst_share_permille: u32,
    overruns: u32,
}

pub struct StepTelemetry {
    budget_us: u32,
    window: Window,
    total_overruns: u64,
}

impl StepTelemetry {
    /// `budget` is the lateness tolerated before a wake counts as an overrun.
    pub fn new(budget: Duration) -> Self {
        Self {
            budget_us: micros(budget),
            window: Window::default(),
            total_overruns: 0,
        }
    }

    /// Record one wake that came `lateness` after the deadline of a sleep
    /// meant to last `interval`.
    pub fn record(&mut self, lateness: Duration, interval: Duration) {
        let late_us = micros(lateness);
        let interval_us = micros(interval).max(1);
        let share = (late_us as u64 * 1_000 / interval_us as u64).min(u32::MAX as u64) as u32;

        let w = &mut self.window;
        w.steps = w.steps.saturating_add(1);
        w.late_sum_us += late_us as u64;
        w.worst_late_us = w.worst_late_us.max(late_us);
        w.worst_share_permille = w.worst_share_permille.max(share);
        if late_us > self.budget_us {
            w.overruns += 1;
            self.total_overruns += 1;
        }
    }

    pub fn summary(&self) -> TelemetrySummary {
        let w = &self.window;
        let mean_late_us = match w.steps {
            0 => 0,
            n => (w.late_sum_us / n as u64) as u32,
        };
        TelemetrySummary {
            steps: w.steps,
            mean_late_us,
            worst_late_us: w.worst_late_us,
            worst_share_permille: w.worst_share_permille,
            overruns: w.overruns,
            total_overruns: self.total_overruns,
        }
    }

    /// Summarize the current window and start a new one.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        let summary = self.summary();
        self.window = Window::default();
        summary
    }
}

fn micros(d: Duration) -> u32 {
    d.as_micros().min(u32::MAX as u128) as u32
}
