//! `PUT /counselors/{id}/rate` - counselor rate and tax settings

use bytes::Bytes;
use hyper::{Method, Request, Response};

use crate::routes::{ok_with, parse_json, route_not_found, segments, FullBody};
use crate::server::AppState;
use crate::services::accounts::{self, RateUpdate, UserView};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    match (req.method(), segments(path, "/counselors").as_slice()) {
        (&Method::PUT, [id, "rate"]) => {
            let caller = state.caller(req).await?;
            let body: RateUpdate = parse_json(req)?;
            let counselor =
                accounts::update_counselor_rate(&state.db, &caller.viewer(), id, body).await?;
            ok_with(
                "Counselor rates updated",
                UserView::new(&counselor, state.system_rate()),
            )
        }
        _ => route_not_found(),
    }
}
