// Completion & Portfolio Synthesizer: detects full verification, performs the
// terminal engagement transition, and creates the one-time anonymized
// proof-of-work record. Runs detached from the review request.

pub mod handlers;
pub mod synthesizer;
