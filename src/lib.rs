// Public API for integration tests and potential library usage

pub mod api;
pub mod assistant;
pub mod auth;
pub mod broadcast;
pub mod gate;
pub mod llm;
pub mod protocol;
pub mod revocation;
pub mod rooms;
pub mod state;
pub mod types;
pub mod ws;
