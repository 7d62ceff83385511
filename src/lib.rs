// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod hub;
pub mod membership;
pub mod pipeline;
pub mod protocol;
pub mod ratelimit;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
