//! Counselor settlement endpoints
//!
//! - `GET /counselor-payments[?year=&month=&status=&counselor=]`
//! - `GET /counselor-payments/summary[?year=&month=&counselor=]`
//! - `POST /counselor-payments/generate` - super-admin, `{ year, month, counselorId? }`
//! - `GET /counselor-payments/{id}`, `GET /counselor-payments/{id}/statement`
//! - `PUT /counselor-payments/{id}/approve` - super-admin
//! - `PUT /counselor-payments/{id}/pay` - super-admin, `{ paymentMethod, notes? }`
//! - `PUT /counselor-payments/{id}/dispute` - owning counselor or super-admin
//! - `PUT /counselor-payments/{id}/status` - super-admin override
//!
//! Only counselors and super-admins reach this module. A counselor sees only
//! their own statements.

use bytes::Bytes;
use hyper::{Method, Request, Response};
use serde::Deserialize;

use crate::auth::{allow, Role};
use crate::db::schemas::{PaymentMethod, PaymentStatus};
use crate::routes::{created, ok, ok_with, parse_enum, parse_json, route_not_found, segments, FullBody, Query};
use crate::server::AppState;
use crate::services::settlement::{self, PaymentQuery, PaymentView};
use crate::types::{Result, WellspringError};

const PREFIX: &str = "/counselor-payments";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    year: i32,
    month: u32,
    #[serde(default)]
    counselor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayBody {
    payment_method: PaymentMethod,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisputeBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    note: Option<String>,
}

fn payment_query(query: &Query) -> Result<PaymentQuery> {
    Ok(PaymentQuery {
        year: query.parse("year")?,
        month: query.parse("month")?,
        status: query
            .get("status")
            .map(|s| parse_enum::<PaymentStatus>("status", s))
            .transpose()?,
        counselor: query.get("counselor").map(str::to_string),
    })
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, PREFIX);
    let db = &state.db;
    let caller = state.caller_in(req, allow::SETTLEMENT).await?;
    let viewer = caller.viewer();

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            let query = payment_query(&Query::from_request(req))?;
            let payments = settlement::list(db, &viewer, &query).await?;
            ok(payments.iter().map(PaymentView::from).collect::<Vec<_>>())
        }

        (&Method::GET, ["summary"]) => {
            let query = Query::from_request(req);
            let (current_year, current_month) = settlement::current_period();
            let year = query.parse("year")?.unwrap_or(current_year);
            let month = query.parse("month")?.unwrap_or(current_month);
            settlement::validate_period(year, month)?;

            match (caller.role(), query.get("counselor")) {
                (Role::Counselor, _) => {
                    ok(settlement::personal_summary(db, caller.id(), year, month).await?)
                }
                (_, Some(counselor)) => {
                    ok(settlement::personal_summary(db, counselor, year, month).await?)
                }
                _ => ok(settlement::period_summary(db, year, month).await?),
            }
        }

        (&Method::POST, ["generate"]) => {
            if !caller.is_super_admin() {
                return Err(WellspringError::Forbidden(
                    "Only a super-admin may generate settlements".into(),
                ));
            }
            let body: GenerateBody = parse_json(req)?;
            let outcome =
                settlement::generate(db, body.year, body.month, body.counselor_id.as_deref())
                    .await?;
            let message = format!(
                "{} settlement(s) created, {} skipped",
                outcome.created, outcome.skipped
            );
            created(&message, outcome)
        }

        (&Method::GET, [id]) => ok(PaymentView::from(&settlement::get(db, &viewer, id).await?)),

        (&Method::GET, [id, "statement"]) => ok(settlement::statement(db, &viewer, id).await?),

        (&Method::PUT, [id, "approve"]) => {
            require_admin(caller.is_super_admin())?;
            let payment = settlement::approve(db, state.sink(), id, caller.id()).await?;
            ok_with("Settlement approved", PaymentView::from(&payment))
        }

        (&Method::PUT, [id, "pay"]) => {
            require_admin(caller.is_super_admin())?;
            let body: PayBody = parse_json(req)?;
            let payment = settlement::pay(
                db,
                state.sink(),
                id,
                body.payment_method,
                body.notes.as_deref(),
                caller.id(),
            )
            .await?;
            ok_with("Settlement paid", PaymentView::from(&payment))
        }

        (&Method::PUT, [id, "dispute"]) => {
            let body: DisputeBody = parse_json(req)?;
            let payment = settlement::dispute(db, state.sink(), &viewer, id, &body.reason).await?;
            ok_with("Dispute submitted", PaymentView::from(&payment))
        }

        (&Method::PUT, [id, "status"]) => {
            require_admin(caller.is_super_admin())?;
            let body: StatusBody = parse_json(req)?;
            let to: PaymentStatus = parse_enum("status", &body.status)?;
            let payment = settlement::set_status(db, id, to, caller.id(), body.note).await?;
            ok_with("Settlement status updated", PaymentView::from(&payment))
        }

        _ => route_not_found(),
    }
}

fn require_admin(is_super_admin: bool) -> Result<()> {
    if is_super_admin {
        Ok(())
    } else {
        Err(WellspringError::Forbidden(
            "Only a super-admin may change settlement status".into(),
        ))
    }
}
