//! Job code and costing approval engine for a multi-company procurement
//! back office: structured code minting, costing entries with an approval
//! workflow, derived financial rollups, and cross-reference maintenance over
//! a document store.

pub mod config;
pub mod directory;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::config::AppSettings;
use crate::services::AppServices;
use crate::store::DocumentStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub services: AppServices,
    pub settings: AppSettings,
}
