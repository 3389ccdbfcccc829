use tracing::debug;

use crate::{
    domain::{Payer, PayerBalance, Points},
    ports::ledger::LedgerPort,
};

use super::{unit_of_work::UnitOfWork, CorruptionDetail, Error};

/// Apply a signed delta to a payer's balance
///
/// The balance record is created if the payer has none yet. Nothing is staged when the new
/// balance would be negative.
pub(crate) async fn adjust_payer_balance<L>(
    uow: &mut UnitOfWork<L>,
    payer: &Payer,
    delta: Points,
) -> Result<PayerBalance, Error>
where
    L: LedgerPort,
{
    let current = uow.balance(payer).await?;
    let new_balance = current
        .as_ref()
        .map_or(0, |balance| balance.balance)
        .checked_add(delta)
        .ok_or_else(|| {
            Error::would_corrupt("adjust_payer_balance", CorruptionDetail::PointsOverflow)
        })?;

    if new_balance < 0 {
        return Err(Error::would_corrupt(
            "adjust_payer_balance",
            CorruptionDetail::NegativeBalance,
        ));
    }

    let balance = match current {
        Some(mut balance) => {
            balance.balance = new_balance;
            uow.update_balance(balance.clone());
            balance
        }
        None => {
            let balance = PayerBalance::new(payer.clone(), new_balance);
            uow.create_balance(balance.clone());
            balance
        }
    };
    debug!(payer = %balance.payer, delta, balance = balance.balance, "staged balance adjustment");

    Ok(balance)
}
