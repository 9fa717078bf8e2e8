use crate::config::Config;
use crate::database::Database;
use crate::enrollment::ListenerRegistry;
use crate::error::{AppError, ErrorEvents};
use crate::messaging::{KeywordModerator, MessageModerator};
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub listeners: ListenerRegistry,
    pub moderator: Arc<dyn MessageModerator>,
}

impl AppState {
    pub fn with_config(config: Config) -> Result<Self, AppError> {
        let database = Database::open(&config.storage.database_path)?;
        Ok(Self::with_database(config, database))
    }

    pub fn with_database(config: Config, database: Database) -> Self {
        let store = Store::new(database, ErrorEvents::new());
        let moderator = Arc::new(KeywordModerator::new(&config.moderation));

        AppState {
            config,
            store,
            listeners: ListenerRegistry::new(),
            moderator,
        }
    }
}
