use derive_new::new;

use crate::database::Database;

/// State shared by every handler. Holds no counters of its own, only the store handle.
#[derive(Debug, Clone, new)]
pub struct App {
    pub database: Database,
}

impl<'a> From<&'a App> for &'a Database {
    fn from(app: &'a App) -> Self {
        &app.database
    }
}
