use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{domain::PayerBalance, ports::ledger::LedgerPort};
use tower::Service;

use super::{DomainLogic, Error};

/// Snapshot of every payer's balance
#[derive(Clone, Copy, Debug, Default)]
pub struct GetBalancesRequest;

impl<L> Service<GetBalancesRequest> for DomainLogic<L>
where
    L: LedgerPort + 'static,
{
    type Response = Vec<PayerBalance>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: GetBalancesRequest) -> Self::Future {
        let ledger = self.ledger.clone();
        // Read-only, so this does not wait for writers
        Box::pin(async move { Ok(ledger.list_balances().await?) })
    }
}
