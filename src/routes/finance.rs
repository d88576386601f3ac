//! Financial profile and counseling goals
//!
//! - `GET|PUT /financial-profile`
//! - `GET|POST /goals`, `PUT /goals/{id}`

use bytes::Bytes;
use hyper::{Method, Request, Response};

use crate::routes::{created, ok, ok_with, parse_json, route_not_found, segments, FullBody};
use crate::server::AppState;
use crate::services::finance::{self, GoalInput, GoalView, ProfileInput};
use crate::types::Result;

pub async fn handle_profile(state: &AppState, req: &Request<Bytes>) -> Result<Response<FullBody>> {
    let caller = state.caller(req).await?;
    match *req.method() {
        Method::GET => ok(finance::profile(&state.db, caller.id()).await?),
        Method::PUT => {
            let body: ProfileInput = parse_json(req)?;
            let view = finance::save_profile(&state.db, caller.id(), body).await?;
            ok_with("Financial profile saved", view)
        }
        _ => route_not_found(),
    }
}

pub async fn handle_goals(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, "/goals");
    let caller = state.caller(req).await?;
    let viewer = caller.viewer();
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            let goals = finance::goals(db, &viewer).await?;
            ok(goals.iter().map(GoalView::from).collect::<Vec<_>>())
        }
        (&Method::POST, []) => {
            let body: GoalInput = parse_json(req)?;
            let goal = finance::create_goal(db, &viewer, body).await?;
            created("Goal created", GoalView::from(&goal))
        }
        (&Method::PUT, [id]) => {
            let body: GoalInput = parse_json(req)?;
            let goal = finance::update_goal(db, &viewer, id, body).await?;
            ok_with("Goal updated", GoalView::from(&goal))
        }
        _ => route_not_found(),
    }
}
