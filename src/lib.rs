// Core matchmaking and relay
pub mod matchmaking;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Shared components
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Supporting modules
pub mod shutdown;
pub mod tasks;
