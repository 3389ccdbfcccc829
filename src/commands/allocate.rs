use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    domain::{AllocationRecord, AvailableRemainder, Payer, PayerChange, Points, SpendRecord},
    ports::ledger::{LedgerPort, RemainderScan},
};

use super::{unit_of_work::UnitOfWork, CorruptionDetail, Error};

/// Outcome of consuming a single remainder
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Allocated {
    pub points: Points,
    /// The payer's balance is negative after this step
    ///
    /// This is allowed mid-walk: a later negative remainder of the same payer can bring it back.
    pub balance_negative: bool,
}

/// Net points deducted per payer, in the order payers were first touched
#[derive(Debug, Default)]
pub(crate) struct SpendResults {
    changes: Vec<PayerChange>,
    index: HashMap<Payer, usize>,
}

impl SpendResults {
    pub fn subtract(&mut self, payer: &Payer, points: Points) -> Result<(), Error> {
        let idx = match self.index.get(payer) {
            Some(idx) => *idx,
            None => {
                self.index.insert(payer.clone(), self.changes.len());
                self.changes.push(PayerChange {
                    payer: payer.clone(),
                    points: 0,
                });
                self.changes.len() - 1
            }
        };
        let change = &mut self.changes[idx];
        change.points = change.points.checked_sub(points).ok_or_else(overflow)?;
        Ok(())
    }

    pub fn into_changes(self) -> Vec<PayerChange> {
        self.changes
    }
}

fn overflow() -> Error {
    Error::would_corrupt("allocate_spend", CorruptionDetail::PointsOverflow)
}

/// Consume up to `still_needed` points from one remainder on behalf of `spend`
pub(crate) async fn allocate_remainder<L>(
    uow: &mut UnitOfWork<L>,
    mut remainder: AvailableRemainder,
    still_needed: Points,
    spend: &SpendRecord,
) -> Result<Allocated, Error>
where
    L: LedgerPort,
{
    let points = remainder.unallocated_points.min(still_needed);

    let mut balance = uow.balance(&remainder.payer).await?.ok_or_else(|| {
        Error::InvalidState(
            format!("remainder {} has no payer balance", remainder.deposit_id).into(),
        )
    })?;
    balance.balance = balance.balance.checked_sub(points).ok_or_else(overflow)?;
    let balance_negative = balance.balance < 0;
    uow.update_balance(balance);

    uow.add_allocation(AllocationRecord {
        allocation_id: Uuid::new_v4(),
        spend_id: spend.spend_id,
        deposit_id: remainder.deposit_id,
        payer: remainder.payer.clone(),
        points_allocated: points,
        timestamp: spend.timestamp,
    });

    remainder.consume(points);
    debug!(
        deposit_id = %remainder.deposit_id,
        payer = %remainder.payer,
        points,
        unallocated = remainder.unallocated_points,
        "allocated from remainder"
    );
    uow.update_remainder(remainder);

    Ok(Allocated {
        points,
        balance_negative,
    })
}

/// Allocate a spend across remainders, oldest first
///
/// Balances may go negative while walking. If any did, the spend is rejected unless every
/// balance is back to zero or more once the walk is done. On rejection the caller must drop the
/// unit of work instead of committing it.
pub(crate) async fn allocate_spend<L>(
    uow: &mut UnitOfWork<L>,
    spend: &SpendRecord,
) -> Result<Vec<PayerChange>, Error>
where
    L: LedgerPort,
{
    walk_remainders(uow, spend, RemainderScan::Covering(spend.points_spent)).await
}

async fn walk_remainders<L>(
    uow: &mut UnitOfWork<L>,
    spend: &SpendRecord,
    scan: RemainderScan,
) -> Result<Vec<PayerChange>, Error>
where
    L: LedgerPort,
{
    let mut remaining = spend.points_spent;
    let mut results = SpendResults::default();
    let mut check_balances = false;

    if remaining > 0 {
        for remainder in uow.unallocated_remainders(scan).await? {
            let payer = remainder.payer.clone();
            let allocated = allocate_remainder(uow, remainder, remaining, spend).await?;
            check_balances |= allocated.balance_negative;
            results.subtract(&payer, allocated.points)?;
            remaining = remaining.checked_sub(allocated.points).ok_or_else(overflow)?;
            if remaining == 0 {
                break;
            }
        }
    }

    if !check_balances {
        return Ok(results.into_changes());
    }

    let negative = uow.negative_balances().await?;
    if negative.is_empty() {
        debug!(spend_id = %spend.spend_id, "negative balances resolved during walk");
        return Ok(results.into_changes());
    }

    warn!(
        spend_id = %spend.spend_id,
        payers = ?negative.iter().map(|balance| balance.payer.as_str()).collect::<Vec<_>>(),
        "spend would leave negative balances"
    );
    Err(Error::would_corrupt(
        "allocate_spend",
        CorruptionDetail::NegativeBalance,
    ))
}
