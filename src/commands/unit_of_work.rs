use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;

use crate::{
    domain::{AllocationRecord, AvailableRemainder, Deposit, Payer, PayerBalance, Points, SpendRecord},
    ports::ledger::{ChangeSet, Error, LedgerPort, RemainderScan},
};

/// Explicit transaction handle for one operation
///
/// Every mutation is staged in memory and only reaches the ledger through [`UnitOfWork::commit`].
/// Reads go through the unit of work so staged records shadow the committed ones. Dropping a
/// unit of work without committing discards everything it staged.
pub struct UnitOfWork<L> {
    ledger: Arc<L>,
    balances: Vec<StagedBalance>,
    balance_index: HashMap<Payer, usize>,
    deposits: Vec<Deposit>,
    remainders: Vec<StagedRemainder>,
    remainder_index: HashMap<Uuid, usize>,
    spends: Vec<SpendRecord>,
    allocations: Vec<AllocationRecord>,
}

struct StagedBalance {
    balance: PayerBalance,
    created: bool,
}

struct StagedRemainder {
    remainder: AvailableRemainder,
    created: bool,
}

impl<L> UnitOfWork<L>
where
    L: LedgerPort,
{
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            balances: Vec::new(),
            balance_index: HashMap::new(),
            deposits: Vec::new(),
            remainders: Vec::new(),
            remainder_index: HashMap::new(),
            spends: Vec::new(),
            allocations: Vec::new(),
        }
    }

    /// Current balance for a payer, staged or committed
    pub async fn balance(&self, payer: &Payer) -> Result<Option<PayerBalance>, Error> {
        match self.balance_index.get(payer) {
            Some(idx) => Ok(Some(self.balances[*idx].balance.clone())),
            None => self.ledger.get_balance(payer.clone()).await,
        }
    }

    /// Every balance, with staged values replacing committed ones
    pub async fn balances(&self) -> Result<Vec<PayerBalance>, Error> {
        let mut balances = self.ledger.list_balances().await?;
        for balance in balances.iter_mut() {
            if let Some(idx) = self.balance_index.get(&balance.payer) {
                balance.balance = self.balances[*idx].balance.balance;
            }
        }
        balances.extend(
            self.balances
                .iter()
                .filter(|staged| staged.created)
                .map(|staged| staged.balance.clone()),
        );

        Ok(balances)
    }

    /// Sum of every balance, saturating at [`Points::MAX`]
    pub async fn total_balance(&self) -> Result<Points, Error> {
        Ok(self
            .balances()
            .await?
            .iter()
            .fold(0, |total: Points, balance| total.saturating_add(balance.balance)))
    }

    pub async fn negative_balances(&self) -> Result<Vec<PayerBalance>, Error> {
        let mut balances = self.balances().await?;
        balances.retain(|balance| balance.balance < 0);
        Ok(balances)
    }

    /// Stage a balance record for a payer seen for the first time
    pub fn create_balance(&mut self, balance: PayerBalance) {
        self.stage_balance(balance, true);
    }

    /// Stage a new value for an existing balance record
    pub fn update_balance(&mut self, balance: PayerBalance) {
        self.stage_balance(balance, false);
    }

    fn stage_balance(&mut self, balance: PayerBalance, created: bool) {
        match self.balance_index.get(&balance.payer) {
            // A balance created in this unit of work stays a creation
            Some(idx) => self.balances[*idx].balance = balance,
            None => {
                self.balance_index
                    .insert(balance.payer.clone(), self.balances.len());
                self.balances.push(StagedBalance { balance, created });
            }
        }
    }

    /// Stage a deposit together with its companion remainder
    pub fn add_deposit(&mut self, deposit: Deposit) {
        let remainder = AvailableRemainder::for_deposit(&deposit);
        self.stage_remainder(remainder, true);
        self.deposits.push(deposit);
    }

    pub fn update_remainder(&mut self, remainder: AvailableRemainder) {
        self.stage_remainder(remainder, false);
    }

    fn stage_remainder(&mut self, remainder: AvailableRemainder, created: bool) {
        match self.remainder_index.get(&remainder.deposit_id) {
            Some(idx) => self.remainders[*idx].remainder = remainder,
            None => {
                self.remainder_index
                    .insert(remainder.deposit_id, self.remainders.len());
                self.remainders.push(StagedRemainder { remainder, created });
            }
        }
    }

    /// Committed remainders that are not fully allocated, oldest first
    ///
    /// Staged updates replace the committed values. Remainders created in this unit of work are
    /// not part of the scan.
    pub async fn unallocated_remainders(
        &self,
        scan: RemainderScan,
    ) -> Result<Vec<AvailableRemainder>, Error> {
        let mut remainders = self.ledger.unallocated_remainders(scan).await?;
        for remainder in remainders.iter_mut() {
            if let Some(idx) = self.remainder_index.get(&remainder.deposit_id) {
                *remainder = self.remainders[*idx].remainder.clone();
            }
        }
        remainders.retain(|remainder| !remainder.fully_allocated);

        Ok(remainders)
    }

    pub fn add_spend(&mut self, spend: SpendRecord) {
        self.spends.push(spend);
    }

    pub fn add_allocation(&mut self, allocation: AllocationRecord) {
        self.allocations.push(allocation);
    }

    /// Everything staged so far
    pub fn changes(&self) -> ChangeSet {
        let mut changes = ChangeSet {
            deposits: self.deposits.clone(),
            spends: self.spends.clone(),
            allocations: self.allocations.clone(),
            ..Default::default()
        };
        for staged in &self.balances {
            if staged.created {
                changes.new_balances.push(staged.balance.clone());
            } else {
                changes.updated_balances.push(staged.balance.clone());
            }
        }
        for staged in &self.remainders {
            if staged.created {
                changes.new_remainders.push(staged.remainder.clone());
            } else {
                changes.updated_remainders.push(staged.remainder.clone());
            }
        }
        changes
    }

    /// Apply everything staged to the ledger as a single change
    pub async fn commit(self) -> Result<(), Error> {
        let changes = self.changes();
        self.ledger.commit(changes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::database::memory::MemoryLedger, ports::ledger::MockLedgerPort};
    use chrono::Utc;
    use mockall::predicate::*;
    use speculoos::prelude::*;

    fn deposit(payer: &str, points: Points) -> Deposit {
        Deposit {
            deposit_id: Uuid::new_v4(),
            payer: payer.into(),
            points,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_staged_balance_shadows_committed() {
        // GIVEN a committed balance for DANNON
        let ledger = Arc::new(MemoryLedger::default());
        ledger
            .commit(ChangeSet {
                new_balances: vec![PayerBalance::new("DANNON".into(), 100)],
                ..Default::default()
            })
            .await
            .unwrap();

        // WHEN staging an update and a new payer
        let mut uow = UnitOfWork::new(ledger.clone());
        uow.update_balance(PayerBalance::new("DANNON".into(), -50));
        uow.create_balance(PayerBalance::new("UNILEVER".into(), 20));

        // THEN reads through the unit of work see the staged values
        assert_that!(uow.balance(&"dannon".into()).await)
            .is_ok()
            .is_equal_to(Some(PayerBalance::new("DANNON".into(), -50)));
        assert_that!(uow.total_balance().await).is_ok().is_equal_to(-30);
        assert_that!(uow.negative_balances().await)
            .is_ok()
            .is_equal_to(vec![PayerBalance::new("DANNON".into(), -50)]);
        // AND the ledger itself is untouched
        assert_that!(ledger.list_balances().await)
            .is_ok()
            .is_equal_to(vec![PayerBalance::new("DANNON".into(), 100)]);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_leaves_no_trace() {
        let ledger = Arc::new(MemoryLedger::default());

        {
            let mut uow = UnitOfWork::new(ledger.clone());
            uow.create_balance(PayerBalance::new("DANNON".into(), 300));
            uow.add_deposit(deposit("DANNON", 300));
        }

        assert_that!(ledger.list_balances().await).is_ok().is_empty();
        assert_that!(ledger.deposits()).is_ok().is_empty();
        assert_that!(ledger.remainders()).is_ok().is_empty();
    }

    #[tokio::test]
    async fn test_commit_sends_changeset() {
        // GIVEN a unit of work with a new payer, a deposit and an updated remainder
        let created = deposit("DANNON", 300);
        let mut existing = AvailableRemainder::for_deposit(&deposit("UNILEVER", 200));
        existing.consume(50);

        let expected = ChangeSet {
            new_balances: vec![PayerBalance::new("DANNON".into(), 300)],
            deposits: vec![created.clone()],
            new_remainders: vec![AvailableRemainder::for_deposit(&created)],
            updated_remainders: vec![existing.clone()],
            ..Default::default()
        };
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_commit()
            .times(1)
            .with(eq(expected))
            .returning(|_| Ok(()));

        let mut uow = UnitOfWork::new(Arc::new(ledger));
        uow.create_balance(PayerBalance::new("DANNON".into(), 0));
        // Updating a balance created in the same unit keeps it a creation
        uow.update_balance(PayerBalance::new("DANNON".into(), 300));
        uow.add_deposit(created);
        uow.update_remainder(existing);

        // WHEN committing
        let res = uow.commit().await;

        // THEN the ledger receives a single changeset
        assert_that!(res).is_ok();
    }

    #[tokio::test]
    async fn test_scan_overlays_staged_remainders() {
        // GIVEN two committed remainders
        let ledger = Arc::new(MemoryLedger::default());
        let first = deposit("DANNON", 300);
        let second = deposit("UNILEVER", 200);
        ledger
            .commit(ChangeSet {
                new_remainders: vec![
                    AvailableRemainder::for_deposit(&first),
                    AvailableRemainder::for_deposit(&second),
                ],
                deposits: vec![first.clone(), second.clone()],
                ..Default::default()
            })
            .await
            .unwrap();

        // WHEN one of them is fully consumed in the unit of work
        let mut uow = UnitOfWork::new(ledger);
        let mut consumed = AvailableRemainder::for_deposit(&first);
        consumed.consume(300);
        uow.update_remainder(consumed);

        // THEN the scan no longer returns it
        let res = uow.unallocated_remainders(RemainderScan::All).await;
        assert_that!(res).is_ok().matches(|remainders| {
            remainders.len() == 1 && remainders[0].deposit_id == second.deposit_id
        });
    }

    #[tokio::test]
    async fn test_total_balance_saturates() {
        let mut ledger = MockLedgerPort::new();
        ledger.expect_list_balances().times(1).returning(|| {
            Ok(vec![
                PayerBalance::new("DANNON".into(), Points::MAX),
                PayerBalance::new("UNILEVER".into(), 1),
            ])
        });
        let uow = UnitOfWork::new(Arc::new(ledger));

        let res = uow.total_balance().await;

        assert_that!(res).is_ok().is_equal_to(Points::MAX);
    }
}
