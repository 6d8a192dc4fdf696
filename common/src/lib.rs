// Common library for the reminder engine: scheduling, polling, digests and their stores

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod digest;
pub mod errors;
pub mod models;
pub mod notification;
pub mod poller;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod telemetry;
