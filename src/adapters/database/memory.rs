use crate::{
    domain::{AllocationRecord, AvailableRemainder, Deposit, Payer, PayerBalance, SpendRecord},
    ports::ledger::{ChangeSet, Error, LedgerPort, RemainderScan},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    /// Balances in the order their payers were first seen
    balances: Vec<PayerBalance>,
    /// Unique index on payer name
    balance_index: HashMap<Payer, usize>,
    deposits: Vec<Deposit>,
    /// Remainders in commit order
    remainders: Vec<AvailableRemainder>,
    remainder_index: HashMap<Uuid, usize>,
    spends: Vec<SpendRecord>,
    allocations: Vec<AllocationRecord>,
}

impl Tables {
    /// Reject the whole changeset before anything is applied
    fn validate(&self, changes: &ChangeSet) -> Result<(), Error> {
        let mut created = HashSet::new();
        for balance in &changes.new_balances {
            if self.balance_index.contains_key(&balance.payer)
                || !created.insert(&balance.payer)
            {
                return Err(Error::DuplicatePayer(balance.payer.clone()));
            }
        }
        for balance in &changes.updated_balances {
            if !self.balance_index.contains_key(&balance.payer) {
                return Err(Error::UnknownPayer(balance.payer.clone()));
            }
        }
        for remainder in &changes.updated_remainders {
            if !self.remainder_index.contains_key(&remainder.deposit_id) {
                return Err(Error::UnknownRemainder(remainder.deposit_id));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for balance in changes.new_balances {
            self.balance_index
                .insert(balance.payer.clone(), self.balances.len());
            self.balances.push(balance);
        }
        for balance in changes.updated_balances {
            let idx = self.balance_index[&balance.payer];
            // Keep the spelling the payer was first recorded with
            self.balances[idx].balance = balance.balance;
        }
        self.deposits.extend(changes.deposits);
        for remainder in changes.new_remainders {
            self.remainder_index
                .insert(remainder.deposit_id, self.remainders.len());
            self.remainders.push(remainder);
        }
        for remainder in changes.updated_remainders {
            let idx = self.remainder_index[&remainder.deposit_id];
            self.remainders[idx] = remainder;
        }
        self.spends.extend(changes.spends);
        self.allocations.extend(changes.allocations);
    }
}

#[async_trait::async_trait]
impl LedgerPort for MemoryLedger {
    async fn get_balance(&self, payer: Payer) -> Result<Option<PayerBalance>, Error> {
        let tables = self.tables.lock()?;
        let balance = tables
            .balance_index
            .get(&payer)
            .map(|idx| tables.balances[*idx].clone());

        Ok(balance)
    }

    async fn list_balances(&self) -> Result<Vec<PayerBalance>, Error> {
        Ok(self.tables.lock()?.balances.clone())
    }

    async fn unallocated_remainders(
        &self,
        scan: RemainderScan,
    ) -> Result<Vec<AvailableRemainder>, Error> {
        let tables = self.tables.lock()?;
        let mut candidates: Vec<&AvailableRemainder> = tables
            .remainders
            .iter()
            .filter(|remainder| !remainder.fully_allocated)
            .collect();
        // Stable, so equal timestamps keep commit order
        candidates.sort_by_key(|remainder| remainder.timestamp);

        let limit = match scan {
            RemainderScan::All => return Ok(candidates.into_iter().cloned().collect()),
            RemainderScan::Covering(points) if points <= 0 => return Ok(Vec::new()),
            RemainderScan::Covering(points) => points,
        };

        let mut covered = 0;
        let mut remainders = Vec::new();
        for remainder in candidates {
            covered = remainder.unallocated_points.saturating_add(covered);
            remainders.push(remainder.clone());
            if covered > limit {
                break;
            }
        }

        Ok(remainders)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), Error> {
        let mut tables = self.tables.lock()?;
        tables.validate(&changes)?;
        tables.apply(changes);

        Ok(())
    }
}

/// Read access to the audit tables
///
/// These are not part of [`LedgerPort`] since the domain logic never reads them back.
impl MemoryLedger {
    pub fn deposits(&self) -> Result<Vec<Deposit>, Error> {
        Ok(self.tables.lock()?.deposits.clone())
    }

    pub fn remainders(&self) -> Result<Vec<AvailableRemainder>, Error> {
        Ok(self.tables.lock()?.remainders.clone())
    }

    pub fn spends(&self) -> Result<Vec<SpendRecord>, Error> {
        Ok(self.tables.lock()?.spends.clone())
    }

    pub fn allocations(&self) -> Result<Vec<AllocationRecord>, Error> {
        Ok(self.tables.lock()?.allocations.clone())
    }
}

/// [`PoisonError`] reduced to its message, since the guard it carries is not `Send`
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
