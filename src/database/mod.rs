mod connections;
mod migrations;
mod models;
mod schema;

pub use connections::Database;
pub use models::*;
pub use schema::*;
