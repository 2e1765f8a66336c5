pub mod adb;
pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod forward;
pub mod logging;
pub mod models;
pub mod pairing;
pub mod screenshot;
pub mod state;
