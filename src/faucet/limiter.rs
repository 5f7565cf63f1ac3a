use chrono::{DateTime, Duration, Utc};

use super::store::FaucetRecord;

/// One disbursement per address per window
pub const FAUCET_COOLDOWN_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Cooling {
        remaining: Duration,
        next_eligible_at: DateTime<Utc>,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Fixed-window limiter. Cooling ends purely by elapsed time, so every check is evaluated
/// fresh from the last record and `now`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        assert!(window > Duration::zero(), "Cooldown window must be positive");
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, last: Option<&FaucetRecord>, now: DateTime<Utc>) -> Eligibility {
        let Some(last) = last else {
            return Eligibility::Eligible;
        };
        if now - last.timestamp >= self.window {
            return Eligibility::Eligible;
        }
        let next_eligible_at = last.timestamp + self.window;
        Eligibility::Cooling {
            remaining: next_eligible_at - now,
            next_eligible_at,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::hours(FAUCET_COOLDOWN_HOURS))
    }
}
