//! HTTP surface of the ledger
//!
//! - `POST /add` adds (or removes) points for a payer
//! - `POST /spend` spends points across payers, oldest first
//! - `GET /balance` lists every payer's balance
//!
//! Rejected operations are answered with a problem details body, see [`problem`].

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::{
    commands::{
        add_points::AddPointsRequest, get_balances::GetBalancesRequest,
        spend_points::SpendPointsRequest, DomainLogic, Error,
    },
    domain::{Payer, Points},
    ports::ledger::LedgerPort,
};

pub mod problem;

pub fn router<L>(domain: DomainLogic<L>) -> Router
where
    L: LedgerPort + 'static,
{
    Router::new()
        .route("/add", post(add_points::<L>))
        .route("/spend", post(spend_points::<L>))
        .route("/balance", get(get_balances::<L>))
        .layer(TraceLayer::new_for_http())
        .with_state(domain)
}

#[derive(Debug, Deserialize)]
pub struct AddPointsBody {
    pub payer: Payer,
    pub points: Points,
    #[serde(alias = "timeStamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SpendPointsBody {
    pub points: Points,
}

/// One `{payer, points}` entry, used both for balances and spend results
#[derive(Debug, Serialize)]
pub struct PayerPoints {
    pub payer: Payer,
    pub points: Points,
}

async fn add_points<L>(
    State(domain): State<DomainLogic<L>>,
    Json(body): Json<AddPointsBody>,
) -> Result<StatusCode, Error>
where
    L: LedgerPort + 'static,
{
    domain
        .oneshot(AddPointsRequest {
            payer: body.payer,
            points: body.points,
            timestamp: body.timestamp,
        })
        .await?;

    Ok(StatusCode::OK)
}

async fn spend_points<L>(
    State(domain): State<DomainLogic<L>>,
    Json(body): Json<SpendPointsBody>,
) -> Result<Json<Vec<PayerPoints>>, Error>
where
    L: LedgerPort + 'static,
{
    let res = domain.oneshot(SpendPointsRequest::new(body.points)).await?;

    Ok(Json(
        res.changes
            .into_iter()
            .map(|change| PayerPoints {
                payer: change.payer,
                points: change.points,
            })
            .collect(),
    ))
}

async fn get_balances<L>(
    State(domain): State<DomainLogic<L>>,
) -> Result<Json<Vec<PayerPoints>>, Error>
where
    L: LedgerPort + 'static,
{
    let balances = domain.oneshot(GetBalancesRequest).await?;

    Ok(Json(
        balances
            .into_iter()
            .map(|balance| PayerPoints {
                payer: balance.payer,
                points: balance.balance,
            })
            .collect(),
    ))
}
