use std::time::Duration;

use derive_new::new;
use serde::de::DeserializeOwned;
use snafu::{IntoError as _, OptionExt as _, ResultExt as _};
use surrealdb::engine::any::Any;
use surrealdb::opt::QueryResult;

use crate::counter::{
    CounterError, EmptyResponseSnafu, StoreQuerySnafu, StoreTimeoutSnafu, StoreUnavailableSnafu,
};

/// A pending query. Parameters can be bound using the [Bindings::bind] method which takes any serializable data structure.
///
/// # Example
/// ```rust,ignore
/// let views: Vec<PageView> = database.sql("SELECT * FROM page_views WHERE path = $path")
///     .bind(("path", "/about"))
///     .fetch_first()
///     .await?;
/// ```
#[derive(Debug, new)]
pub struct Bindings<'a> {
    query: surrealdb::method::Query<'a, Any>,
    timeout: Duration,
}

impl Bindings<'_> {
    pub fn bind(mut self, params: impl serde::Serialize) -> Self {
        let query = self.query;
        self.query = query.bind(params);
        self
    }

    /// Execute the query and return a [surrealdb::Response] which is SurrealDB's way to represent a list of statements returned from the database.
    ///
    /// Fails with [CounterError::StoreTimeout] when the round trip exceeds the timeout and with
    /// [CounterError::StoreUnavailable] when the connection itself is broken.
    pub async fn execute(self) -> Result<surrealdb::Response, CounterError> {
        let Self { query, timeout } = self;

        let pending = std::future::IntoFuture::into_future(query);

        let response = match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) if is_connectivity(&source) => {
                return Err(StoreUnavailableSnafu.into_error(source))
            }
            Ok(Err(source)) => return Err(StoreQuerySnafu.into_error(source)),
            Err(_) => return StoreTimeoutSnafu { timeout }.fail(),
        };

        tracing::trace!(?response, "executed query");
        Ok(response)
    }

    /// Execute the query and deserialize the result of the first statement.
    pub async fn fetch_first<T: DeserializeOwned>(self) -> Result<T, CounterError>
    where
        usize: QueryResult<T>,
    {
        let mut statements = self.execute().await?;
        statements.take::<T>(0).context(StoreQuerySnafu)
    }

    /// Like [Bindings::fetch_first], but the first statement must produce exactly one record.
    pub async fn fetch_one<T: DeserializeOwned>(self) -> Result<T, CounterError> {
        self.fetch_first::<Option<T>>()
            .await?
            .context(EmptyResponseSnafu)
    }
}

/// Errors that mean the store could not be reached at all, as opposed to a statement being rejected.
fn is_connectivity(error: &surrealdb::Error) -> bool {
    use surrealdb::error::Api;

    matches!(
        error,
        surrealdb::Error::Api(Api::ConnectionUninitialised | Api::Http(_) | Api::Ws(_))
    )
}
