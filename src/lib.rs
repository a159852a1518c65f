pub mod config;
pub mod cve;
pub mod freegame;
pub mod logging;
pub mod monitor;
pub mod notifications;
pub mod state;
pub mod version;
