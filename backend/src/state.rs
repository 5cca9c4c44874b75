use crate::{config::Config, db::connection::DbPool, realtime::hub::RealtimeHub};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub hub: RealtimeHub,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config, hub: RealtimeHub) -> Self {
        Self { pool, config, hub }
    }
}
