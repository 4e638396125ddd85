// Invite & Consensus Manager: persists proposals, fans out invites, and drives
// the per-member accept/reject protocol under optimistic concurrency control.

pub mod handlers;
pub mod invites;
