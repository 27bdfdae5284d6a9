// Re-export the server modules for the binary and the integration tests.
pub mod config;
pub mod game;
