//! Infrastructure shared by the thread engine: storage, configuration,
//! audit emission, and output helpers.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod pool;
pub mod schemas;
pub mod store;
pub mod time;
