use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::oracle::OracleClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Payout ledger: balance increments keyed by candidate id.
    pub redis: RedisClient,
    pub oracle: OracleClient,
    pub config: Config,
}
