use crate::call::CallController;
use crate::media::{RoomTransport, TokenIssuer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Matching bus endpoint handed to new controllers
    pub matching_url: String,
    pub transport: Arc<dyn RoomTransport>,
    pub tokens: Arc<dyn TokenIssuer>,
    /// Active call controllers (session_id -> controller)
    pub calls: Arc<RwLock<HashMap<String, CallController>>>,
}

impl AppState {
    pub fn new(
        matching_url: impl Into<String>,
        transport: Arc<dyn RoomTransport>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            matching_url: matching_url.into(),
            transport,
            tokens,
            calls: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
