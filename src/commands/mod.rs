use std::{borrow::Cow, fmt, sync::Arc};

use tokio::sync::Mutex;

pub mod add_points;
mod adjust_balance;
mod allocate;
pub mod get_balances;
mod record_deposit;
pub mod spend_points;
pub mod unit_of_work;

pub struct DomainLogic<L> {
    ledger: Arc<L>,
    /// Held for the whole unit of work by every writing command, so two units of work never
    /// interleave their staged changes.
    writer: Arc<Mutex<()>>,
}

impl<L> DomainLogic<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            writer: Arc::new(Mutex::new(())),
        }
    }
}

impl<L> Clone for DomainLogic<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            writer: self.writer.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("ledger port error: {0:?}")]
    Ledger(#[from] crate::ports::ledger::Error),

    /// The request was rejected because applying it would break a ledger invariant
    ///
    /// Nothing staged for the operation is committed.
    #[error("the operation {operation} would corrupt data: {detail}")]
    WouldCorruptData {
        operation: &'static str,
        detail: CorruptionDetail,
    },

    #[error("invalid state: {0}")]
    InvalidState(Cow<'static, str>),
}

impl Error {
    fn would_corrupt(operation: &'static str, detail: CorruptionDetail) -> Self {
        Self::WouldCorruptData { operation, detail }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorruptionDetail {
    /// A payer balance would end up below zero
    NegativeBalance,
    /// The amount to spend is negative
    NegativeSpend,
    /// The amount to spend is more than the sum of all balances
    SpendExceedsAvailable,
    /// A balance or running total would not fit in [`Points`](crate::domain::Points)
    PointsOverflow,
}

impl fmt::Display for CorruptionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorruptionDetail::NegativeBalance => "A payer's balance cannot be negative.",
            CorruptionDetail::NegativeSpend => "The number of points to spend cannot be negative.",
            CorruptionDetail::SpendExceedsAvailable => {
                "Cannot spend more points than the total available across all payers."
            }
            CorruptionDetail::PointsOverflow => {
                "The number of points exceeds what a balance can hold."
            }
        })
    }
}
