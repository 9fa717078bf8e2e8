use crate::config::Config;
use std::fs;
use std::io;
use std::path::Path;

impl Config {
    pub fn create_storage_dirs(&self) -> io::Result<()> {
        // We only need to create the database's parent storage directories,
        // as SQLite3 will otherwise manage that for us.
        let database_path = Path::new(&self.storage.database_path);
        if database_path.exists() {
            return Ok(());
        }

        match database_path.parent() {
            Some(parents) if !parents.as_os_str().is_empty() => fs::create_dir_all(parents),
            _ => Ok(()),
        }
    }
}
