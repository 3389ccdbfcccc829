use uuid::Uuid;

use crate::domain::{
    AllocationRecord, AvailableRemainder, Deposit, Payer, PayerBalance, Points, SpendRecord,
};

/// Storage for payer balances, deposits, remainders, spends and allocations
///
/// Reads return committed state only. Writes are never made one record at a time: callers
/// stage everything in a [`ChangeSet`] and hand it to [`LedgerPort::commit`], which must apply
/// it as a whole or not at all.
#[mockall::automock]
#[async_trait::async_trait]
pub trait LedgerPort: Send + Sync {
    async fn get_balance(&self, payer: Payer) -> Result<Option<PayerBalance>, Error>;
    async fn list_balances(&self) -> Result<Vec<PayerBalance>, Error>;
    /// Remainders that are not fully allocated, oldest first
    ///
    /// Remainders with the same timestamp are returned in the order they were committed.
    async fn unallocated_remainders(
        &self,
        scan: RemainderScan,
    ) -> Result<Vec<AvailableRemainder>, Error>;
    async fn commit(&self, changes: ChangeSet) -> Result<(), Error>;
}

/// How far [`LedgerPort::unallocated_remainders`] should read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemainderScan {
    /// Stop as soon as the cumulative unallocated points exceed the given amount
    ///
    /// Nothing is returned for an amount of zero or less.
    Covering(Points),
    /// Every remainder that is not fully allocated
    All,
}

/// Mutations staged by a unit of work
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new_balances: Vec<PayerBalance>,
    pub updated_balances: Vec<PayerBalance>,
    pub deposits: Vec<Deposit>,
    pub new_remainders: Vec<AvailableRemainder>,
    pub updated_remainders: Vec<AvailableRemainder>,
    pub spends: Vec<SpendRecord>,
    pub allocations: Vec<AllocationRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_balances.is_empty()
            && self.updated_balances.is_empty()
            && self.deposits.is_empty()
            && self.new_remainders.is_empty()
            && self.updated_remainders.is_empty()
            && self.spends.is_empty()
            && self.allocations.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A balance record already exists for this payer
    ///
    /// Payer names are unique. This is raised when two units of work both try to create the
    /// first balance for the same payer.
    #[error("payer {0} already has a balance record")]
    DuplicatePayer(Payer),

    /// Trying to update a balance record that was never created
    #[error("payer {0} has no balance record")]
    UnknownPayer(Payer),

    /// Trying to update a remainder that was never created
    #[error("remainder for deposit {0} does not exist")]
    UnknownRemainder(Uuid),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
