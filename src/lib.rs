//! Crate entrypoint wiring together configuration, inventory, the sync
//! engine, persistence and the HTTP API.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod jobs;
pub mod powerdns;
pub mod sync;
pub mod validation;
pub mod zone;

use config::SyncConfig;
use db::Db;
use inventory::Inventory;
use jobs::scheduler::Scheduler;

use std::sync::Arc;

/// Complete application dependencies shared across handlers.
pub struct AppState {
    pub config: Arc<SyncConfig>,
    pub db: Db,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(config: SyncConfig, db: Db, inventory: Arc<dyn Inventory>) -> Self {
        let config = Arc::new(config);
        let scheduler = Scheduler::new(db.clone(), Arc::clone(&config), inventory);
        Self { config, db, scheduler }
    }
}

/// Arc-wrapped version of `AppState` passed into Axum extensions.
pub type SharedState = Arc<AppState>;
