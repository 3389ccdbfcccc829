use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{Payer, Points},
    ports::ledger::LedgerPort,
};
use chrono::{DateTime, Utc};
use tower::Service;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    adjust_balance::adjust_payer_balance, record_deposit::record_deposit,
    unit_of_work::UnitOfWork, DomainLogic, Error,
};

#[derive(Clone, Debug)]
pub struct AddPointsRequest {
    pub payer: Payer,
    /// Points to add, or to remove when negative
    pub points: Points,
    /// When the points were earned, used to spend the oldest points first
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AddPointsResponse {
    pub deposit_id: Uuid,
    pub payer: Payer,
    /// Balance of the payer after the deposit
    pub balance: Points,
}

impl<L> Service<AddPointsRequest> for DomainLogic<L>
where
    L: LedgerPort + 'static,
{
    type Response = AddPointsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AddPointsRequest) -> Self::Future {
        let ledger = self.ledger.clone();
        let writer = self.writer.clone();
        Box::pin(async move {
            let _writer = writer.lock_owned().await;
            let mut uow = UnitOfWork::new(ledger);

            // Stage the balance change first, it is the only step that can reject
            let balance = match adjust_payer_balance(&mut uow, &req.payer, req.points).await {
                Ok(balance) => balance,
                Err(err) => {
                    warn!(payer = %req.payer, points = req.points, error = %err, "rejected points");
                    return Err(err);
                }
            };
            let deposit = record_deposit(&mut uow, &balance, req.points, req.timestamp);

            uow.commit().await?;
            info!(
                payer = %deposit.payer,
                points = deposit.points,
                balance = balance.balance,
                "added points"
            );

            Ok(AddPointsResponse {
                deposit_id: deposit.deposit_id,
                payer: deposit.payer,
                balance: balance.balance,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::memory::MemoryLedger,
        commands::{test_support::assert_ledger_invariants, CorruptionDetail},
        domain::PayerBalance,
        ports::ledger::MockLedgerPort,
    };
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn request(payer: &str, points: Points, timestamp: &str) -> AddPointsRequest {
        AddPointsRequest {
            payer: payer.into(),
            points,
            timestamp: timestamp.parse().unwrap(),
        }
    }

    #[fixture]
    fn ledger() -> Arc<MemoryLedger> {
        Arc::new(MemoryLedger::default())
    }

    /// Each deposit is valid on its own against an empty ledger
    #[rstest]
    #[case(request("DANNON", 1000, "2020-11-02T14:00:00Z"))]
    #[case(request("UNILEVER", 200, "2020-10-31T11:00:00Z"))]
    #[case(request("MILLER COORS", 10000, "2020-11-01T14:00:00Z"))]
    #[case(request("DANNON", 300, "2020-10-31T10:00:00Z"))]
    #[tokio::test]
    async fn test_call_individual(ledger: Arc<MemoryLedger>, #[case] req: AddPointsRequest) {
        // GIVEN an empty ledger
        let domain = DomainLogic::new(ledger.clone());

        // WHEN adding points
        let res = domain.clone().oneshot(req.clone()).await;

        // THEN exactly one deposit, one remainder and one balance are stored
        assert_that!(res).is_ok().matches(|res| res.balance == req.points);
        assert_that!(ledger.deposits())
            .is_ok()
            .matches(|deposits| deposits.len() == 1 && deposits[0].points == req.points);
        assert_that!(ledger.remainders()).is_ok().has_length(1);
        assert_that!(ledger.list_balances().await)
            .is_ok()
            .is_equal_to(vec![PayerBalance::new(req.payer.clone(), req.points)]);
        assert_ledger_invariants(&ledger).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_sequence(ledger: Arc<MemoryLedger>) {
        // GIVEN a sequence where the negative deposit is covered by earlier ones
        let domain = DomainLogic::new(ledger.clone());
        let requests = [
            request("DANNON", 300, "2020-10-31T10:00:00Z"),
            request("UNILEVER", 200, "2020-10-31T11:00:00Z"),
            request("DANNON", -200, "2020-10-31T15:00:00Z"),
            request("MILLER COORS", 10000, "2020-11-01T14:00:00Z"),
            request("DANNON", 1000, "2020-11-02T14:00:00Z"),
        ];

        // WHEN adding each of them
        for req in requests {
            let res = domain.clone().oneshot(req).await;
            assert_that!(res).is_ok();
        }

        // THEN the balances add up
        assert_that!(ledger.list_balances().await)
            .is_ok()
            .is_equal_to(vec![
                PayerBalance::new("DANNON".into(), 1100),
                PayerBalance::new("UNILEVER".into(), 200),
                PayerBalance::new("MILLER COORS".into(), 10000),
            ]);
        assert_ledger_invariants(&ledger).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_some_rejected(ledger: Arc<MemoryLedger>) {
        let domain = DomainLogic::new(ledger.clone());
        let requests = [
            request("DANNON", 1000, "2020-11-02T14:00:00Z"),
            request("UNILEVER", 200, "2020-10-31T11:00:00Z"),
            request("DANNON", -2000, "2020-10-31T15:00:00Z"),
            request("MILLER COORS", 10000, "2020-11-01T14:00:00Z"),
            request("DANNON", 300, "2020-10-31T10:00:00Z"),
        ];

        let mut failures = 0;
        for req in requests {
            if domain.clone().oneshot(req).await.is_err() {
                failures += 1;
            }
        }

        assert_that!(failures).is_equal_to(1);
        assert_that!(ledger.deposits()).is_ok().has_length(4);
        assert_that!(ledger.remainders()).is_ok().has_length(4);
        assert_that!(ledger.get_balance("DANNON".into()).await)
            .is_ok()
            .is_equal_to(Some(PayerBalance::new("DANNON".into(), 1300)));
        assert_ledger_invariants(&ledger).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_negative_on_empty(ledger: Arc<MemoryLedger>) {
        // GIVEN an empty ledger
        let domain = DomainLogic::new(ledger.clone());

        // WHEN removing points from a payer that has none
        let res = domain
            .clone()
            .oneshot(request("DANNON", -200, "2020-10-31T15:00:00Z"))
            .await;

        // THEN the request is rejected and the ledger stays empty
        assert_that!(res).is_err().matches(|err| {
            matches!(
                err,
                Error::WouldCorruptData {
                    detail: CorruptionDetail::NegativeBalance,
                    ..
                }
            )
        });
        assert_that!(ledger.list_balances().await).is_ok().is_empty();
        assert_that!(ledger.deposits()).is_ok().is_empty();
        assert_that!(ledger.remainders()).is_ok().is_empty();
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_matches_payer_case_insensitively(ledger: Arc<MemoryLedger>) {
        let domain = DomainLogic::new(ledger.clone());

        domain
            .clone()
            .oneshot(request("Dannon", 300, "2020-10-31T10:00:00Z"))
            .await
            .unwrap();
        let res = domain
            .clone()
            .oneshot(request("DANNON", -100, "2020-10-31T11:00:00Z"))
            .await;

        assert_that!(res)
            .is_ok()
            .matches(|res| res.payer.as_str() == "Dannon" && res.balance == 200);
        assert_that!(ledger.list_balances().await).is_ok().has_length(1);
        assert_ledger_invariants(&ledger).await;
    }

    #[tokio::test]
    async fn test_call_rejected_does_not_commit() {
        // GIVEN a ledger port that only expects a balance read
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_get_balance()
            .times(1)
            .returning(|payer| Ok(Some(PayerBalance::new(payer, 50))));
        ledger.expect_commit().times(0);
        let domain = DomainLogic::new(Arc::new(ledger));

        // WHEN removing more than the payer has
        let res = domain
            .clone()
            .oneshot(request("DANNON", -51, "2020-10-31T11:00:00Z"))
            .await;

        // THEN nothing is committed
        assert_that!(res).is_err();
        Arc::into_inner(domain.ledger).unwrap().checkpoint();
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_balance_overflow(ledger: Arc<MemoryLedger>) {
        // GIVEN a payer already at the largest balance
        let domain = DomainLogic::new(ledger.clone());
        domain
            .clone()
            .oneshot(request("DANNON", Points::MAX, "2020-10-31T10:00:00Z"))
            .await
            .unwrap();

        // WHEN adding one more point
        let res = domain
            .clone()
            .oneshot(request("DANNON", 1, "2020-10-31T11:00:00Z"))
            .await;

        // THEN the request is rejected and the ledger keeps a single deposit
        assert_that!(res).is_err().matches(|err| {
            matches!(
                err,
                Error::WouldCorruptData {
                    detail: CorruptionDetail::PointsOverflow,
                    ..
                }
            )
        });
        assert_that!(ledger.deposits()).is_ok().has_length(1);
        assert_that!(ledger.list_balances().await)
            .is_ok()
            .is_equal_to(vec![PayerBalance::new("DANNON".into(), Points::MAX)]);
    }
}
