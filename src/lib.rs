//! # QuickBooks Online Connector Library
//!
//! OAuth token management, paginated import and record export between a
//! local ledger and QuickBooks Online companies, plus the HTTP surface and
//! scheduler that drive them.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod qbo;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;
