//! Per-domain completion tracking
//!
//! Keeps a rolling window of recent completions for every domain and derives
//! the success rate and average completion time the decision engine scores on.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;
use shared::Domain;

/// Default window size per domain
const DEFAULT_WINDOW: usize = 100;

/// Success rate reported for a domain with no history
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
struct CompletionSample {
    success: bool,
    duration: Duration,
}

/// Aggregated view of one domain's recent work
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DomainPerformance {
    pub samples: usize,
    pub success_rate: f64,
    pub avg_completion_ms: f64,
    pub total_completed: u64,
    pub total_failed: u64,
}

impl Default for DomainPerformance {
    fn default() -> Self {
        Self {
            samples: 0,
            success_rate: DEFAULT_SUCCESS_RATE,
            avg_completion_ms: 0.0,
            total_completed: 0,
            total_failed: 0,
        }
    }
}

/// Tracks completions over a bounded window per domain
#[derive(Debug)]
pub struct PerformanceTracker {
    windows: HashMap<Domain, VecDeque<CompletionSample>>,
    totals: HashMap<Domain, (u64, u64)>,
    window_size: usize,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window_size: usize) -> Self {
        Self {
            windows: HashMap::new(),
            totals: HashMap::new(),
            window_size: window_size.max(1),
        }
    }

    /// Record a finished task for a domain
    pub fn record_completion(&mut self, domain: Domain, success: bool, duration: Duration) {
        let window = self.windows.entry(domain).or_default();
        window.push_back(CompletionSample { success, duration });
        while window.len() > self.window_size {
            window.pop_front();
        }

        let totals = self.totals.entry(domain).or_insert((0, 0));
        if success {
            totals.0 += 1;
        } else {
            totals.1 += 1;
        }
    }

    pub fn domain(&self, domain: Domain) -> DomainPerformance {
        let (total_completed, total_failed) = self.totals.get(&domain).copied().unwrap_or((0, 0));
        let Some(window) = self.windows.get(&domain).filter(|w| !w.is_empty()) else {
            return DomainPerformance {
                total_completed,
                total_failed,
                ..DomainPerformance::default()
            };
        };

        let samples = window.len();
        let successes = window.iter().filter(|s| s.success).count();
        let total_ms: f64 = window.iter().map(|s| s.duration.as_secs_f64() * 1000.0).sum();

        DomainPerformance {
            samples,
            success_rate: successes as f64 / samples as f64,
            avg_completion_ms: total_ms / samples as f64,
            total_completed,
            total_failed,
        }
    }

    pub fn snapshot(&self) -> HashMap<Domain, DomainPerformance> {
        self.windows.keys().map(|d| (*d, self.domain(*d))).collect()
    }

    pub fn reset(&mut self) {
        self.windows.clear();
        self.totals.clear();
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}
