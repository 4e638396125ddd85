// Squad Matcher: candidate pool fetch, Oracle suggestion, heuristic backstop.
// Pure read + external call — persistence happens in the consensus invite step.
// All Oracle calls go through the oracle module; no direct API calls here.

pub mod handlers;
pub mod heuristic;
pub mod matcher;
pub mod pool;
