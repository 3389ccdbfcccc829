use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    domain::{Deposit, PayerBalance, Points},
    ports::ledger::LedgerPort,
};

use super::unit_of_work::UnitOfWork;

/// Stage an immutable deposit for the payer of `balance`, along with its remainder
pub(crate) fn record_deposit<L>(
    uow: &mut UnitOfWork<L>,
    balance: &PayerBalance,
    points: Points,
    timestamp: DateTime<Utc>,
) -> Deposit
where
    L: LedgerPort,
{
    let deposit = Deposit {
        deposit_id: Uuid::new_v4(),
        payer: balance.payer.clone(),
        points,
        timestamp,
    };
    uow.add_deposit(deposit.clone());
    deposit
}
