pub mod config;
pub mod error;
pub mod fetch;
pub mod leaderboard;
pub mod logging;
pub mod poll;
pub mod process;
pub mod store;
