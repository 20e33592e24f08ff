//! HTTP control surface for the desktop shell:
//! - POST /calls - Start waiting (customer) or listening (agent)
//! - GET /calls/:id - Session snapshot
//! - POST /calls/:id/connect - Manual media join (agent confirmation)
//! - POST /calls/:id/disconnect - End the wait/call
//! - POST /calls/:id/profanity - Record an abusive-speech incident
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
