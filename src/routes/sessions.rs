//! Counseling session endpoints
//!
//! - `GET /counseling-sessions[?status=]` - sessions in the caller's scope
//! - `POST /counseling-sessions` - book a session (employee, manager)
//! - `GET /counseling-sessions/{id}`
//! - `PUT /counseling-sessions/{id}/status`
//! - `PUT /counseling-sessions/{id}/assign` - super-admin manual assignment
//! - `PUT /counseling-sessions/{id}/confirm` - assigned counselor accepts
//! - `PUT /counseling-sessions/{id}/notes` - counselor record
//! - `PUT /counseling-sessions/{id}/rating`
//! - `PUT /counseling-sessions/{id}/dispute`
//! - `PUT /counseling-sessions/{id}/dispute-status` - super-admin review
//!
//! Every session leaving this module goes through the visibility projection.

use bytes::Bytes;
use chrono::Utc;
use hyper::{Method, Request, Response};
use serde::Deserialize;

use crate::auth::allow;
use crate::db::schemas::{CounselingSessionDoc, SessionStatus};
use crate::routes::{created, ok, ok_with, parse_enum, parse_json, route_not_found, segments, FullBody, Query};
use crate::server::AppState;
use crate::services::assignment;
use crate::services::sessions::{
    self, CreateSessionRequest, DisputeStatusInput, RatingInput, RecordInput, SessionQuery,
};
use crate::services::visibility::{project_counseling, CounselingSessionView, Viewer};
use crate::types::{Result, WellspringError};

const PREFIX: &str = "/counseling-sessions";

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody {
    counselor_id: String,
}

#[derive(Debug, Deserialize)]
struct DisputeBody {
    #[serde(default)]
    reason: String,
}

fn view(viewer: &Viewer, session: &CounselingSessionDoc) -> CounselingSessionView {
    project_counseling(viewer, session)
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, PREFIX);
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            let caller = state.caller(req).await?;
            let query = SessionQuery {
                status: Query::from_request(req)
                    .get("status")
                    .map(|s| parse_enum("status", s))
                    .transpose()?,
            };
            let viewer = caller.viewer();
            let sessions = sessions::list(db, &caller, &query).await?;
            ok(sessions.iter().map(|s| view(&viewer, s)).collect::<Vec<_>>())
        }

        (&Method::POST, []) => {
            let caller = state.caller_in(req, allow::SESSION_BOOKING).await?;
            let body: CreateSessionRequest = parse_json(req)?;
            let session = sessions::create(
                db,
                state.sink(),
                &caller.user,
                body,
                state.system_rate(),
                Utc::now(),
            )
            .await?;
            let message = if session.counselor.is_some() {
                "Session booked and counselor assigned"
            } else {
                "Session booked, awaiting counselor assignment"
            };
            created(message, view(&caller.viewer(), &session))
        }

        (&Method::GET, [id]) => {
            let caller = state.caller(req).await?;
            let session = sessions::get(db, &caller, id).await?;
            ok(view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "status"]) => {
            let caller = state.caller(req).await?;
            let body: StatusBody = parse_json(req)?;
            let next: SessionStatus = parse_enum("status", &body.status)?;
            let session = sessions::update_status(db, &caller, id, next, Utc::now()).await?;
            ok_with("Session status updated", view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "assign"]) => {
            let caller = state.caller_in(req, allow::SUPER_ADMIN).await?;
            let body: AssignBody = parse_json(req)?;
            if body.counselor_id.trim().is_empty() {
                return Err(WellspringError::invalid("counselorId", "is required"));
            }
            let session = assignment::manual_assign(
                db,
                state.sink(),
                id,
                &body.counselor_id,
                state.system_rate(),
            )
            .await?;
            ok_with("Counselor assigned", view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "confirm"]) => {
            let caller = state.caller_in(req, allow::COUNSELOR).await?;
            let session = assignment::confirm(db, state.sink(), caller.id(), id).await?;
            ok_with("Session confirmed", view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "notes"]) => {
            let caller = state.caller(req).await?;
            let body: RecordInput = parse_json(req)?;
            let session = sessions::update_record(db, &caller, id, body).await?;
            ok_with("Session record saved", view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "rating"]) => {
            let caller = state.caller(req).await?;
            let body: RatingInput = parse_json(req)?;
            let session = sessions::rate(db, &caller, id, body, Utc::now()).await?;
            ok_with("Thank you for your rating", view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "dispute"]) => {
            let caller = state.caller(req).await?;
            let body: DisputeBody = parse_json(req)?;
            let session =
                sessions::raise_dispute(db, state.sink(), &caller, id, &body.reason, Utc::now())
                    .await?;
            ok_with("Dispute submitted", view(&caller.viewer(), &session))
        }

        (&Method::PUT, [id, "dispute-status"]) => {
            let caller = state.caller_in(req, allow::SUPER_ADMIN).await?;
            let body: DisputeStatusInput = parse_json(req)?;
            let session = sessions::update_dispute_status(
                db,
                state.sink(),
                caller.id(),
                id,
                body,
                Utc::now(),
            )
            .await?;
            ok_with("Dispute updated", view(&caller.viewer(), &session))
        }

        _ => route_not_found(),
    }
}
