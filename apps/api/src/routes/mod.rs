pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::completion::handlers as completion_handlers;
use crate::consensus::handlers as consensus_handlers;
use crate::matching::handlers as matching_handlers;
use crate::milestones::handlers as milestone_handlers;
use crate::reassignment::handlers as reassignment_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Squad matching (read-only; drafts, no persistence)
        .route(
            "/api/v1/projects/:id/squads/match",
            post(matching_handlers::handle_match_squads),
        )
        // Invite & consensus
        .route(
            "/api/v1/squads/invite",
            post(consensus_handlers::handle_invite_squad),
        )
        .route(
            "/api/v1/squads/:id/respond",
            post(consensus_handlers::handle_respond_to_invite),
        )
        .route(
            "/api/v1/invites",
            get(consensus_handlers::handle_list_invites),
        )
        // Milestone tracking
        .route(
            "/api/v1/engagements/:project_id/:candidate_id/tasks/:index/submit",
            post(milestone_handlers::handle_submit_task),
        )
        .route(
            "/api/v1/engagements/:project_id/:candidate_id/tasks/:index/review",
            post(milestone_handlers::handle_review_task),
        )
        .route(
            "/api/v1/engagements/:project_id/:candidate_id/progress",
            get(milestone_handlers::handle_get_progress),
        )
        // Portfolio
        .route(
            "/api/v1/portfolio/:candidate_id",
            get(completion_handlers::handle_get_portfolio),
        )
        // Reassignment
        .route(
            "/api/v1/projects/:id/modules/:module_id/replacements",
            get(reassignment_handlers::handle_list_replacements),
        )
        .route(
            "/api/v1/projects/:id/modules/:module_id/switch",
            post(reassignment_handlers::handle_switch_candidate),
        )
        .with_state(state)
}
