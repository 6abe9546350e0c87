use std::time::Duration;

use derive_new::new;
use snafu::{ensure, Location, ResultExt as _, Snafu};
use surrealdb::{engine::any::Any, opt::auth, Surreal};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use url::Url;

/// Timed query builder over the shared connection.
pub mod query;

/// Macros for declaring counter kinds.
pub mod macros;

pub use query::Bindings;

use crate::config::DatabaseConfig;
use crate::counter::{self, Counter, CounterError};
use crate::error::{ApplicationError, ConnectDatabaseSnafu, NoConnectAttemptsSnafu};
use crate::model::{ButtonClick, PageView};
use crate::Located;

pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

const SETUP: &str = include_str!("../schema.surrealql");

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    #[snafu(display("cannot connect to the database `{url}` at {location}: {source}"))]
    DatabaseConnection {
        url: Url,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cannot sign in to the database `{url}` at {location}: {source}"))]
    SignIn {
        url: Url,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cannot use `{namespace}/{database}` at {location}: {source}"))]
    SelectDatabase {
        namespace: String,
        database: String,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to apply the table schema at {location}: {source}"))]
    ApplySchema {
        source: CounterError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to register the unique index of `{table}` at {location}: {source}"))]
    RegisterIndex {
        table: &'static str,
        source: CounterError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for DatabaseError {
    fn location(&self) -> Location {
        match self {
            DatabaseError::DatabaseConnection { location, .. }
            | DatabaseError::SignIn { location, .. }
            | DatabaseError::SelectDatabase { location, .. }
            | DatabaseError::ApplySchema { location, .. }
            | DatabaseError::RegisterIndex { location, .. } => *location,
        }
    }
}

/// Represents a database wrapper.
///
/// The inner client is reference counted, so cloning is cheap and every clone shares the same connection.
/// Every query issued through [Database::sql] is bounded by the configured timeout.
#[derive(Debug, Clone, new)]
pub struct Database {
    database: Surreal<Any>,
    timeout: Duration,
}

impl Database {
    /// Connect to the configured endpoint, select the namespace and database, then register the schema.
    #[tracing::instrument(skip(config), fields(url = %config.url))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = &config.url;

        let database = surrealdb::engine::any::connect(url.as_str())
            .await
            .context(DatabaseConnectionSnafu { url: url.clone() })?;

        if let Some((username, password)) = config.credentials() {
            database
                .signin(auth::Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username,
                    password,
                })
                .await
                .context(SignInSnafu { url: url.clone() })?;
        }

        database
            .use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .context(SelectDatabaseSnafu {
                namespace: &config.namespace,
                database: &config.database,
            })?;

        let database = Database::new(database, config.timeout);
        database.setup().await?;

        tracing::info!("connected to the database");
        Ok(database)
    }

    /// Register tables, fields and the unique key index of every counter kind.
    ///
    /// Every statement is a `DEFINE`, so repeating the registration leaves the schema unchanged.
    pub async fn setup(&self) -> Result<()> {
        self.sql(SETUP)
            .execute()
            .await
            .and_then(|response| response.check().context(counter::StoreQuerySnafu))
            .context(ApplySchemaSnafu)?;

        counter::ensure_index::<ButtonClick>(self)
            .await
            .context(RegisterIndexSnafu {
                table: ButtonClick::table(),
            })?;

        counter::ensure_index::<PageView>(self)
            .await
            .context(RegisterIndexSnafu {
                table: PageView::table(),
            })?;

        Ok(())
    }

    /// Create a builder to execute arbitrary SurrealQL on the database.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let clicks: Vec<ButtonClick> = db.sql("SELECT * FROM button_clicks WHERE path = $path")
    ///     .bind(("path", "/pricing"))
    ///     .fetch_first()
    ///     .await?;
    /// ```
    pub fn sql(&self, query: impl surrealdb::opt::IntoQuery) -> Bindings<'_> {
        Bindings::new(self.database.query(query), self.timeout)
    }
}

impl std::ops::Deref for Database {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.database
    }
}

/// Connect with exponential backoff, giving up after `connect_attempts` tries.
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Database, ApplicationError> {
    ensure!(config.connect_attempts > 0, NoConnectAttemptsSnafu);

    let strategy = ExponentialBackoff::from_millis(2)
        .factor(100)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(config.connect_attempts - 1);

    Retry::spawn(strategy, || async {
        Database::connect(config).await.inspect_err(|err| {
            tracing::warn!(%err, location = %err.location(), "could not connect to the database");
        })
    })
    .await
    .context(ConnectDatabaseSnafu)
}

#[cfg(test)]
pub(crate) async fn memory() -> Database {
    Database::connect(&DatabaseConfig::memory())
        .await
        .expect("in-memory database should always connect")
}
