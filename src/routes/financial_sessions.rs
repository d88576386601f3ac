//! Financial session endpoints
//!
//! - `GET /financial-sessions[?status=]`
//! - `POST /financial-sessions` - clients and advisors
//! - `GET /financial-sessions/{id}`
//! - `PUT /financial-sessions/{id}/{status,record,feedback}`

use bytes::Bytes;
use chrono::Utc;
use hyper::{Method, Request, Response};
use serde::Deserialize;

use crate::auth::allow;
use crate::db::schemas::SessionStatus;
use crate::routes::{created, ok, ok_with, parse_enum, parse_json, route_not_found, segments, FullBody, Query};
use crate::server::AppState;
use crate::services::financial_sessions::{
    self, CreateFinancialSessionRequest, FeedbackInput, FinancialRecordInput,
};
use crate::services::visibility::project_financial;
use crate::types::Result;

const PREFIX: &str = "/financial-sessions";

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, PREFIX);
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            let caller = state.caller(req).await?;
            let status: Option<SessionStatus> = Query::from_request(req)
                .get("status")
                .map(|s| parse_enum("status", s))
                .transpose()?;
            let viewer = caller.viewer();
            let sessions = financial_sessions::list(db, &caller, status).await?;
            ok(sessions
                .iter()
                .map(|s| project_financial(&viewer, s))
                .collect::<Vec<_>>())
        }

        (&Method::POST, []) => {
            let caller = state.caller_in(req, allow::FINANCIAL_BOOKING).await?;
            let body: CreateFinancialSessionRequest = parse_json(req)?;
            let session =
                financial_sessions::create(db, state.sink(), &caller, body, Utc::now()).await?;
            created("Financial session booked", project_financial(&caller.viewer(), &session))
        }

        (&Method::GET, [id]) => {
            let caller = state.caller(req).await?;
            let session = financial_sessions::get(db, &caller, id).await?;
            ok(project_financial(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "status"]) => {
            let caller = state.caller(req).await?;
            let body: StatusBody = parse_json(req)?;
            let next: SessionStatus = parse_enum("status", &body.status)?;
            let session = financial_sessions::update_status(db, &caller, id, next).await?;
            ok_with("Session status updated", project_financial(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "record"]) => {
            let caller = state.caller(req).await?;
            let body: FinancialRecordInput = parse_json(req)?;
            let session = financial_sessions::update_record(db, &caller, id, body).await?;
            ok_with("Session record saved", project_financial(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "feedback"]) => {
            let caller = state.caller(req).await?;
            let body: FeedbackInput = parse_json(req)?;
            let session =
                financial_sessions::submit_feedback(db, &caller, id, body, Utc::now()).await?;
            ok_with("Thank you for your feedback", project_financial(&caller.viewer(), &session))
        }

        _ => route_not_found(),
    }
}
