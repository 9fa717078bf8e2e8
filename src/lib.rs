pub mod app_state;
pub mod config;
pub mod database;
pub mod documents;
pub mod enrollment;
pub mod error;
pub mod filters;
pub mod institutions;
pub mod messaging;
pub mod reports;
pub mod roster;
pub mod routes;
pub mod session;
pub mod storage;
pub mod store;
