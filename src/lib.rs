pub mod auth;
pub mod cache;
pub mod configuration;
pub mod error;
pub mod housekeeper;
pub mod logger;
pub mod models;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod validators;
