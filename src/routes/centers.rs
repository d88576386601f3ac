//! Counseling center endpoints
//!
//! Reads are open to any signed-in user; changes are super-admin only.
//!
//! - `GET /counseling-centers`, `POST /counseling-centers`
//! - `GET|PUT|DELETE /counseling-centers/{id}`
//! - `POST /counseling-centers/{id}/counselors` - body `{ counselorId }`
//! - `DELETE /counseling-centers/{id}/counselors/{counselorId}`

use bytes::Bytes;
use hyper::{Method, Request, Response};
use serde::{Deserialize, Serialize};

use crate::auth::allow;
use crate::routes::{created, ok, ok_with, parse_json, route_not_found, segments, FullBody};
use crate::server::AppState;
use crate::services::centers::{self, CenterInput, CenterView};
use crate::types::{Result, WellspringError};

const PREFIX: &str = "/counseling-centers";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberBody {
    #[serde(default)]
    counselor_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOutcome {
    id: String,
    released_counselors: u64,
}

async fn center_view(state: &AppState, id: &str) -> Result<CenterView> {
    let center = centers::load_center(&state.db, id).await?;
    centers::view(&state.db, &center).await
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, PREFIX);
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            state.caller(req).await?;
            let mut views = Vec::new();
            for center in centers::list_centers(db).await? {
                views.push(centers::view(db, &center).await?);
            }
            ok(views)
        }

        (&Method::POST, []) => {
            state.caller_in(req, allow::SUPER_ADMIN).await?;
            let body: CenterInput = parse_json(req)?;
            let center = centers::create_center(db, body).await?;
            created("Counseling center created", centers::view(db, &center).await?)
        }

        (&Method::GET, [id]) => {
            state.caller(req).await?;
            ok(center_view(state, id).await?)
        }

        (&Method::PUT, [id]) => {
            state.caller_in(req, allow::SUPER_ADMIN).await?;
            let body: CenterInput = parse_json(req)?;
            let center = centers::update_center(db, id, body).await?;
            ok_with("Counseling center updated", centers::view(db, &center).await?)
        }

        (&Method::DELETE, [id]) => {
            state.caller_in(req, allow::SUPER_ADMIN).await?;
            let released = centers::delete_center(db, id).await?;
            ok_with(
                "Counseling center deleted",
                DeleteOutcome {
                    id: id.to_string(),
                    released_counselors: released,
                },
            )
        }

        (&Method::POST, [id, "counselors"]) => {
            state.caller_in(req, allow::SUPER_ADMIN).await?;
            let body: MemberBody = parse_json(req)?;
            if body.counselor_id.trim().is_empty() {
                return Err(WellspringError::invalid("counselorId", "is required"));
            }
            let center = centers::add_counselor(db, id, &body.counselor_id).await?;
            ok_with("Counselor added to center", centers::view(db, &center).await?)
        }

        (&Method::DELETE, [id, "counselors", counselor_id]) => {
            state.caller_in(req, allow::SUPER_ADMIN).await?;
            let center = centers::remove_counselor(db, id, counselor_id).await?;
            ok_with("Counselor removed from center", centers::view(db, &center).await?)
        }

        _ => route_not_found(),
    }
}
