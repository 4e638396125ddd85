// Milestone Tracker: per-task review state for engaged candidates, derived
// module/job progress, and the completion/payout triggers that hang off review.

pub mod handlers;
pub mod tracker;
