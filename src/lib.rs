pub mod access;
pub mod clickhouse_store;
pub mod config;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod object_store;
pub mod otlp;
pub mod queue;
pub mod relational;
pub mod worker;

use std::sync::Arc;

use clickhouse_store::ClickhouseStore;
use config::Config;
use object_store::ObjectStore;
use queue::TaskQueue;
use relational::RelationalStore;

#[derive(Clone)]
pub struct AppState {
    pub relational: Arc<RelationalStore>,
    pub ch: ClickhouseStore,
    pub object_store: ObjectStore,
    pub queue: TaskQueue,
    pub config: Arc<Config>,
}
