// Reassignment Manager: replaces the candidate on a stalled module without
// touching verified work elsewhere or any synthesized portfolio entry.

pub mod handlers;
pub mod switcher;
