use std::{
    fmt,
    hash::{Hash, Hasher},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signed number of points
///
/// Deposits may carry a negative amount, and a balance may transiently go below zero while a
/// spend is being allocated.
pub type Points = i64;

/// Name of a payer
///
/// Payers are matched case-insensitively: `"dannon"` and `"DANNON"` are the same payer. The
/// original spelling is kept for display.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payer(String);

impl Payer {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

impl PartialEq for Payer {
    fn eq(&self, other: &Self) -> bool {
        self.folded().eq(other.folded())
    }
}

impl Eq for Payer {}

impl Hash for Payer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
    }
}

impl fmt::Display for Payer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Payer {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Running total of unallocated points for one payer
///
/// Created on the first deposit for a payer and never deleted. Outside of an in-flight spend
/// allocation, `balance` is never negative and equals the sum of `unallocated_points` across the
/// payer's remainders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayerBalance {
    pub payer: Payer,
    pub balance: Points,
}

impl PayerBalance {
    pub fn new(payer: Payer, balance: Points) -> Self {
        Self { payer, balance }
    }
}

/// Immutable record of points added for a payer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub deposit_id: Uuid,
    pub payer: Payer,
    /// Originally recorded delta, may be negative
    pub points: Points,
    /// Caller-supplied timestamp, used for oldest-first ordering
    pub timestamp: DateTime<Utc>,
}

/// Unspent portion of a [`Deposit`]
///
/// There is exactly one remainder per deposit, sharing its `deposit_id`. The deposit itself stays
/// untouched; spends only ever consume from the remainder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailableRemainder {
    pub deposit_id: Uuid,
    pub payer: Payer,
    pub original_points: Points,
    pub allocated_points: Points,
    /// `original_points - allocated_points`
    ///
    /// This is negative for a negative deposit that has not been paid down yet.
    pub unallocated_points: Points,
    pub fully_allocated: bool,
    pub timestamp: DateTime<Utc>,
}

impl AvailableRemainder {
    /// Create the companion remainder for a freshly recorded deposit
    pub fn for_deposit(deposit: &Deposit) -> Self {
        Self {
            deposit_id: deposit.deposit_id,
            payer: deposit.payer.clone(),
            original_points: deposit.points,
            allocated_points: 0,
            unallocated_points: deposit.points,
            fully_allocated: false,
            timestamp: deposit.timestamp,
        }
    }

    /// Move `points` from unallocated to allocated
    pub fn consume(&mut self, points: Points) {
        self.allocated_points += points;
        self.unallocated_points -= points;
        self.fully_allocated = self.unallocated_points == 0;
    }
}

/// Immutable record of a request to spend points
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendRecord {
    pub spend_id: Uuid,
    pub points_spent: Points,
    pub timestamp: DateTime<Utc>,
}

/// Evidence that a spend consumed some points from a remainder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub allocation_id: Uuid,
    pub spend_id: Uuid,
    pub deposit_id: Uuid,
    pub payer: Payer,
    pub points_allocated: Points,
    pub timestamp: DateTime<Utc>,
}

/// Net change applied to a payer's balance by a spend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayerChange {
    pub payer: Payer,
    pub points: Points,
}
