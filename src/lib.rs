// Library exports for weighboard
// This allows integration tests and the binary to share modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extractors;
pub mod measurements;
pub mod ranking;
pub mod routes;
pub mod state;
