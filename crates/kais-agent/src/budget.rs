//! Budget Tracker (§4.4, §6, C6): enforces the per-Cell ledger invariant
//! `available = allocated - spent - delegated >= 0` and the `maxCostPerHour`
//! / `maxTotalCost` resource limits from a Cell's `ResourceLimits`.
//!
//! Mutated only from this Cell's own think/act loop, but `remaining()` must
//! also be readable synchronously by the `spawn_cell` tool's validator
//! (`kais_tools::SpawnHost::remaining_budget`) — a plain `std::sync::Mutex`
//! gives both without forcing that trait method to become async.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use kais_core::{Error, LedgerEntry, LedgerOp, Result};

/// One hour-windowed spend, tracked alongside the ledger so `maxCostPerHour`
/// can be enforced without replaying the whole ledger on every check. Exact
/// windowing isn't specified by the source (§9 Open Questions); a rolling
/// window keyed off wall-clock `Instant`s is the simplest correct choice.
struct HourlySpend {
    entries: Vec<(Instant, f64)>,
}

impl HourlySpend {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn record(&mut self, now: Instant, amount: f64) {
        self.entries.push((now, amount));
    }

    fn total_within(&mut self, now: Instant, window: Duration) -> f64 {
        self.entries.retain(|(at, _)| now.duration_since(*at) <= window);
        self.entries.iter().map(|(_, amount)| amount).sum()
    }
}

struct Inner {
    allocated: f64,
    spent: f64,
    delegated: f64,
    max_total_cost: Option<f64>,
    max_cost_per_hour: Option<f64>,
    hourly: HourlySpend,
    ledger: Vec<LedgerEntry>,
}

/// Ledger-backed budget for a single Cell (§3 `BudgetBalance`).
pub struct BudgetTracker {
    cell_id: String,
    inner: Mutex<Inner>,
}

impl BudgetTracker {
    pub fn new(cell_id: impl Into<String>, allocated: f64, max_total_cost: Option<f64>, max_cost_per_hour: Option<f64>) -> Self {
        Self {
            cell_id: cell_id.into(),
            inner: Mutex::new(Inner {
                allocated,
                spent: 0.0,
                delegated: 0.0,
                max_total_cost,
                max_cost_per_hour,
                hourly: HourlySpend::new(),
                ledger: vec![LedgerEntry { op: LedgerOp::Allocate, amount: allocated, at: Utc::now(), note: None }],
            }),
        }
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    /// `allocated - spent - delegated`. Synchronous by design — called from
    /// `SpawnHost::remaining_budget` without an async context.
    pub fn remaining(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        inner.allocated - inner.spent - inner.delegated
    }

    pub fn allocated(&self) -> f64 {
        self.inner.lock().unwrap().allocated
    }

    /// Records a spend (e.g. a turn's LLM cost). Rejects if it would push
    /// `available` below zero, or breach `maxTotalCost`/`maxCostPerHour`.
    pub fn spend(&self, amount: f64) -> Result<()> {
        self.apply(LedgerOp::Spend, amount, |inner, now| {
            let projected_total = inner.spent + amount;
            if let Some(max) = inner.max_total_cost {
                if projected_total > max {
                    return Err(Error::BudgetExceeded(format!(
                        "would spend {projected_total:.4} total against maxTotalCost {max:.4}"
                    )));
                }
            }
            if let Some(max_hour) = inner.max_cost_per_hour {
                let projected_hour = inner.hourly.total_within(now, Duration::from_secs(3600)) + amount;
                if projected_hour > max_hour {
                    return Err(Error::BudgetExceeded(format!(
                        "would spend {projected_hour:.4} in the last hour against maxCostPerHour {max_hour:.4}"
                    )));
                }
            }
            inner.spent += amount;
            inner.hourly.record(now, amount);
            Ok(())
        })
    }

    /// Delegates `amount` to a spawned child (§4.4 spawn_cell). The amount
    /// stays counted against `available` until the child's budget is
    /// reclaimed or the child completes.
    pub fn delegate(&self, amount: f64) -> Result<()> {
        self.apply(LedgerOp::Delegate, amount, |inner, _now| {
            inner.delegated += amount;
            Ok(())
        })
    }

    /// Returns unused delegated budget to this Cell, e.g. after a child
    /// completes with budget to spare.
    pub fn reclaim(&self, amount: f64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let amount = amount.min(inner.delegated);
        inner.delegated -= amount;
        inner.ledger.push(LedgerEntry { op: LedgerOp::Reclaim, amount, at: Utc::now(), note: None });
        Ok(())
    }

    /// Increases `allocated`, e.g. an operator top-up.
    pub fn top_up(&self, amount: f64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.allocated += amount;
        inner.ledger.push(LedgerEntry { op: LedgerOp::TopUp, amount, at: Utc::now(), note: None });
        Ok(())
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.inner.lock().unwrap().ledger.clone()
    }

    fn apply(&self, op: LedgerOp, amount: f64, mutate: impl FnOnce(&mut Inner, Instant) -> Result<()>) -> Result<()> {
        if amount <= 0.0 {
            return Err(Error::validation(format!("ledger amount must be positive, got {amount}")));
        }
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        mutate(&mut inner, now)?;
        debug_assert!(inner.allocated - inner.spent - inner.delegated >= -1e-9);
        inner.ledger.push(LedgerEntry { op, amount, at: Utc::now(), note: None });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_reduces_available_and_keeps_invariant() {
        let tracker = BudgetTracker::new("c1", 1.0, None, None);
        tracker.spend(0.4).unwrap();
        assert!((tracker.remaining() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn spend_past_max_total_cost_is_rejected() {
        let tracker = BudgetTracker::new("c1", 10.0, Some(1.0), None);
        tracker.spend(0.5).unwrap();
        let err = tracker.spend(0.6).unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded(_)));
        // rejected spend must not have mutated state
        assert!((tracker.remaining() - 9.5).abs() < 1e-9);
    }

    #[test]
    fn delegate_then_reclaim_restores_availability() {
        let tracker = BudgetTracker::new("c1", 1.0, None, None);
        tracker.delegate(0.25).unwrap();
        assert!((tracker.remaining() - 0.75).abs() < 1e-9);
        tracker.reclaim(0.25).unwrap();
        assert!((tracker.remaining() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn negative_or_zero_amounts_are_rejected() {
        let tracker = BudgetTracker::new("c1", 1.0, None, None);
        assert!(tracker.spend(0.0).is_err());
        assert!(tracker.spend(-1.0).is_err());
    }

    #[test]
    fn top_up_increases_allocated() {
        let tracker = BudgetTracker::new("c1", 1.0, None, None);
        tracker.top_up(0.5).unwrap();
        assert!((tracker.allocated() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn max_cost_per_hour_rejects_burst_spend() {
        let tracker = BudgetTracker::new("c1", 100.0, None, Some(1.0));
        tracker.spend(0.9).unwrap();
        let err = tracker.spend(0.2).unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded(_)));
    }
}
