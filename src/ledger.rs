//! Session-credit arithmetic for the global subscription.
//!
//! A student holds one balance regardless of how many courses they are
//! enrolled in. Everything here is pure; persistence lives in
//! `database::subscriptions`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

pub const SESSIONS_PER_MONTH: i64 = 4;
pub const LOW_SESSION_THRESHOLD: i64 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Plan duration must be at least one month")]
    InvalidPlan,

    #[error("Number of sessions must be greater than zero")]
    InvalidAmount,

    #[error("Student has no remaining sessions")]
    Exhausted,
}

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        AppError::Validation(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjustment {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Low,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total_sessions: i64,
    pub remaining_sessions: i64,
    pub plan_duration_months: i64,
    pub warning: bool,
}

impl Balance {
    pub fn for_plan(months: i64) -> Result<Self, LedgerError> {
        if months <= 0 {
            return Err(LedgerError::InvalidPlan);
        }
        let sessions = months * SESSIONS_PER_MONTH;
        Ok(Self {
            total_sessions: sessions,
            remaining_sessions: sessions,
            plan_duration_months: months,
            warning: sessions <= LOW_SESSION_THRESHOLD,
        })
    }

    pub fn empty() -> Self {
        Self {
            total_sessions: 0,
            remaining_sessions: 0,
            plan_duration_months: 1,
            warning: false,
        }
    }

    pub fn apply(self, adjustment: Adjustment, n: i64) -> Result<Self, LedgerError> {
        match adjustment {
            Adjustment::Add => self.add(n),
            Adjustment::Remove => self.remove(n),
        }
    }

    pub fn add(self, n: i64) -> Result<Self, LedgerError> {
        if n <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(Self::recalculated(
            self.total_sessions + n,
            self.remaining_sessions + n,
        ))
    }

    pub fn remove(self, n: i64) -> Result<Self, LedgerError> {
        if n <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(Self::recalculated(
            (self.total_sessions - n).max(0),
            (self.remaining_sessions - n).max(0),
        ))
    }

    /// One attended session. The plan length is left as purchased.
    pub fn consume_one(self) -> Result<Self, LedgerError> {
        if self.remaining_sessions <= 0 {
            return Err(LedgerError::Exhausted);
        }
        let remaining = self.remaining_sessions - 1;
        Ok(Self {
            remaining_sessions: remaining,
            warning: remaining <= LOW_SESSION_THRESHOLD,
            ..self
        })
    }

    fn recalculated(total: i64, remaining: i64) -> Self {
        Self {
            total_sessions: total,
            remaining_sessions: remaining,
            plan_duration_months: plan_months_for(total),
            warning: remaining <= LOW_SESSION_THRESHOLD,
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        match self.remaining_sessions {
            r if r <= 0 => SubscriptionStatus::Expired,
            r if r <= LOW_SESSION_THRESHOLD => SubscriptionStatus::Low,
            _ => SubscriptionStatus::Active,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.status() == SubscriptionStatus::Expired
    }

    pub fn used_sessions(&self) -> i64 {
        (self.plan_duration_months * SESSIONS_PER_MONTH - self.remaining_sessions).max(0)
    }

    pub fn progress_percent(&self) -> f64 {
        let base = self.plan_duration_months * SESSIONS_PER_MONTH;
        if base <= 0 {
            return 0.0;
        }
        (self.used_sessions() as f64 / base as f64 * 100.0).min(100.0)
    }
}

fn plan_months_for(total: i64) -> i64 {
    let months = (total + SESSIONS_PER_MONTH - 1) / SESSIONS_PER_MONTH;
    months.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_creation() {
        let balance = Balance::for_plan(3).unwrap();
        assert_eq!(balance.total_sessions, 12);
        assert_eq!(balance.remaining_sessions, 12);
        assert_eq!(balance.plan_duration_months, 3);
        assert!(!balance.warning);
        assert_eq!(balance.status(), SubscriptionStatus::Active);

        assert_eq!(Balance::for_plan(0), Err(LedgerError::InvalidPlan));
    }

    #[test]
    fn test_add_recomputes_plan() {
        let balance = Balance::for_plan(1).unwrap().add(3).unwrap();
        assert_eq!(balance.total_sessions, 7);
        assert_eq!(balance.remaining_sessions, 7);
        assert_eq!(balance.plan_duration_months, 2);

        assert_eq!(Balance::empty().add(0), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn test_remove_saturates_at_zero() {
        let balance = Balance::for_plan(1).unwrap().remove(10).unwrap();
        assert_eq!(balance.total_sessions, 0);
        assert_eq!(balance.remaining_sessions, 0);
        assert_eq!(balance.plan_duration_months, 1);
        assert!(balance.warning);
        assert_eq!(balance.status(), SubscriptionStatus::Expired);
    }

    #[test]
    fn test_consume_keeps_plan() {
        let mut balance = Balance::for_plan(2).unwrap();
        for _ in 0..5 {
            balance = balance.consume_one().unwrap();
        }
        assert_eq!(balance.total_sessions, 8);
        assert_eq!(balance.remaining_sessions, 3);
        assert_eq!(balance.plan_duration_months, 2);
        assert!(!balance.warning);

        balance = balance.consume_one().unwrap();
        assert!(balance.warning);
        assert_eq!(balance.status(), SubscriptionStatus::Low);
    }

    #[test]
    fn test_consume_exhausted() {
        let balance = Balance::for_plan(1).unwrap().remove(4).unwrap();
        assert_eq!(balance.consume_one(), Err(LedgerError::Exhausted));
    }

    #[test]
    fn test_usage_figures() {
        let balance = Balance::for_plan(1).unwrap().consume_one().unwrap();
        assert_eq!(balance.used_sessions(), 1);
        assert!((balance.progress_percent() - 25.0).abs() < f64::EPSILON);

        let topped_up = Balance::for_plan(1).unwrap().add(1).unwrap();
        assert_eq!(topped_up.plan_duration_months, 2);
        assert_eq!(topped_up.used_sessions(), 3);
    }

    #[test]
    fn test_empty_balance() {
        let balance = Balance::empty();
        assert!(balance.is_expired());
        assert!(!balance.warning);
        assert_eq!(balance.used_sessions(), 4);
    }
}
