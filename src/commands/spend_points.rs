use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{PayerChange, Points, SpendRecord},
    ports::ledger::LedgerPort,
};
use chrono::{DateTime, Utc};
use tower::Service;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    allocate::allocate_spend, unit_of_work::UnitOfWork, CorruptionDetail, DomainLogic, Error,
};

#[derive(Clone, Debug)]
pub struct SpendPointsRequest {
    pub points: Points,
    /// Defaults to the current time
    pub timestamp: Option<DateTime<Utc>>,
}

impl SpendPointsRequest {
    pub fn new(points: Points) -> Self {
        Self {
            points,
            timestamp: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SpendPointsResponse {
    pub spend_id: Uuid,
    /// Net change applied to each payer's balance, negative when points were taken from it
    pub changes: Vec<PayerChange>,
}

impl<L> Service<SpendPointsRequest> for DomainLogic<L>
where
    L: LedgerPort + 'static,
{
    type Response = SpendPointsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SpendPointsRequest) -> Self::Future {
        let ledger = self.ledger.clone();
        let writer = self.writer.clone();
        Box::pin(async move {
            let _writer = writer.lock_owned().await;
            let mut uow = UnitOfWork::new(ledger);

            let spend = create_spend_record(
                &mut uow,
                req.points,
                req.timestamp.unwrap_or_else(Utc::now),
            )
            .await
            .map_err(|err| {
                warn!(points = req.points, error = %err, "rejected spend");
                err
            })?;

            // A rejected allocation drops the unit of work with everything it staged
            let changes = allocate_spend(&mut uow, &spend).await?;

            uow.commit().await?;
            info!(
                spend_id = %spend.spend_id,
                points = spend.points_spent,
                payers = changes.len(),
                "spent points"
            );

            Ok(SpendPointsResponse {
                spend_id: spend.spend_id,
                changes,
            })
        })
    }
}

/// Validate the amount to spend and stage the spend record
async fn create_spend_record<L>(
    uow: &mut UnitOfWork<L>,
    points: Points,
    timestamp: DateTime<Utc>,
) -> Result<SpendRecord, Error>
where
    L: LedgerPort,
{
    if points < 0 {
        return Err(Error::would_corrupt(
            "create_spend_record",
            CorruptionDetail::NegativeSpend,
        ));
    }

    let available = uow.total_balance().await?;
    if points > available {
        return Err(Error::would_corrupt(
            "create_spend_record",
            CorruptionDetail::SpendExceedsAvailable,
        ));
    }

    let spend = SpendRecord {
        spend_id: Uuid::new_v4(),
        points_spent: points,
        timestamp,
    };
    uow.add_spend(spend.clone());

    Ok(spend)
}
