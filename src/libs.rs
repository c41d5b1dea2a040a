pub mod api;
pub mod chat;
pub mod config;
pub mod core;
pub mod logging;
pub mod models;
pub mod socket;
pub mod state;
pub mod uniffi;
pub mod utils;
