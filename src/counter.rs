use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{Location, ResultExt as _, Snafu};
use tracing::instrument;

use crate::database::Database;
use crate::Located;

pub type Result<T, E = CounterError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CounterError {
    #[snafu(display("`{field}` is required and must not be empty"))]
    Validation {
        field: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("the counter store is unavailable: {source}"))]
    StoreUnavailable {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "the counter store did not answer within {}",
        humantime::format_duration(*timeout)
    ))]
    StoreTimeout {
        timeout: Duration,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("the counter store rejected the query: {source}"))]
    StoreQuery {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("the counter store returned no record"))]
    EmptyResponse {
        #[snafu(implicit)]
        location: Location,
    },
}

impl CounterError {
    /// The caller sent an incomplete key, nothing was written.
    pub fn is_validation(&self) -> bool {
        matches!(self, CounterError::Validation { .. })
    }

    /// The store could not be reached or did not answer in time. Retrying an increment after this may double count.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CounterError::StoreUnavailable { .. } | CounterError::StoreTimeout { .. }
        )
    }
}

impl Located for CounterError {
    fn location(&self) -> Location {
        match self {
            CounterError::Validation { location, .. }
            | CounterError::StoreUnavailable { location, .. }
            | CounterError::StoreTimeout { location, .. }
            | CounterError::StoreQuery { location, .. }
            | CounterError::EmptyResponse { location } => *location,
        }
    }
}

/// How [list] orders the counters of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Whatever order the store yields.
    Unspecified,
    /// Highest count first. Equal counts come back in store order.
    CountDescending,
}

/// The fields identifying exactly one counter record.
///
/// Implemented through [define_key!](crate::define_key).
pub trait CounterKey: Serialize + Debug + Send + Sync {
    /// Serialized names of the key fields, in record id order.
    const FIELDS: &'static [&'static str];

    /// Reject keys with a missing or blank field.
    fn validate(&self) -> Result<()>;
}

/// A persisted occurrence counter. Implemented through [define_counter!](crate::define_counter).
pub trait Counter: DeserializeOwned + Send + Sync + Sized {
    type Key: CounterKey;

    const ORDER: ListOrder;

    /// Returns the name of the table holding this kind of counter.
    fn table() -> &'static str;
}

/// Declare the unique index over the key fields of `C`. Re-applying it is harmless.
#[instrument(skip(db), fields(table = C::table()))]
pub async fn ensure_index<C: Counter>(db: &Database) -> Result<()> {
    db.sql(index_statement::<C>())
        .execute()
        .await?
        .check()
        .context(StoreQuerySnafu)?;

    Ok(())
}

/// Add one to the counter identified by `key`, inserting it with a count of one if it does not exist yet.
///
/// The record id is derived from the key, so the lookup, the insert and the increment happen in a
/// single `UPDATE` statement that the store applies atomically.
#[instrument(skip(db), fields(table = C::table()))]
pub async fn increment<C: Counter>(key: &C::Key, db: &Database) -> Result<C> {
    key.validate()?;

    let counter = db
        .sql(upsert_statement::<C>())
        .bind(key)
        .fetch_one::<C>()
        .await?;

    tracing::debug!("counter incremented");
    Ok(counter)
}

/// Every counter of kind `C`, ordered according to [Counter::ORDER].
#[instrument(skip(db), fields(table = C::table()))]
pub async fn list<C: Counter>(db: &Database) -> Result<Vec<C>> {
    db.sql(list_statement::<C>()).fetch_first::<Vec<C>>().await
}

fn index_statement<C: Counter>() -> String {
    format!(
        "DEFINE INDEX {table}_key ON TABLE {table} COLUMNS {columns} UNIQUE",
        table = C::table(),
        columns = <C::Key as CounterKey>::FIELDS.join(", "),
    )
}

fn upsert_statement<C: Counter>() -> String {
    let fields = <C::Key as CounterKey>::FIELDS;

    let id = fields
        .iter()
        .map(|field| format!("${field}"))
        .collect::<Vec<_>>()
        .join(", ");

    let assignments = fields
        .iter()
        .map(|field| format!("{field} = ${field}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE type::thing('{table}', [{id}]) SET {assignments}, count += 1 RETURN AFTER",
        table = C::table(),
    )
}

fn list_statement<C: Counter>() -> String {
    let order = match C::ORDER {
        ListOrder::Unspecified => "",
        ListOrder::CountDescending => " ORDER BY count DESC",
    };

    format!(
        "SELECT {fields}, count FROM {table}{order}",
        fields = <C::Key as CounterKey>::FIELDS.join(", "),
        table = C::table(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use surrealdb::Surreal;

    use crate::database::memory;
    use crate::model::{ButtonClick, ButtonClickKey, PageView, PageViewKey};

    fn click(button_id: &str, path: &str) -> ButtonClickKey {
        ButtonClickKey::new(button_id.to_string(), path.to_string())
    }

    fn clicked(button_id: &str, path: &str, count: u64) -> ButtonClick {
        ButtonClick {
            button_id: button_id.to_string(),
            path: path.to_string(),
            count,
        }
    }

    #[test]
    fn statements_follow_the_key_fields() {
        assert_eq!(
            upsert_statement::<ButtonClick>(),
            "UPDATE type::thing('button_clicks', [$buttonId, $path]) SET buttonId = $buttonId, path = $path, count += 1 RETURN AFTER"
        );
        assert_eq!(
            list_statement::<ButtonClick>(),
            "SELECT buttonId, path, count FROM button_clicks ORDER BY count DESC"
        );
        assert_eq!(
            list_statement::<PageView>(),
            "SELECT path, count FROM page_views"
        );
        assert_eq!(
            index_statement::<PageView>(),
            "DEFINE INDEX page_views_key ON TABLE page_views COLUMNS path UNIQUE"
        );
    }

    #[tokio::test]
    async fn first_increment_creates_the_counter() {
        let db = memory().await;

        let counter = ButtonClick::increment(&click("cta-1", "/home"), &db)
            .await
            .unwrap();
        assert_eq!(counter, clicked("cta-1", "/home", 1));

        let clicks = ButtonClick::list(&db).await.unwrap();
        assert_eq!(clicks, vec![clicked("cta-1", "/home", 1)]);
    }

    #[tokio::test]
    async fn sequential_increments_accumulate() {
        let db = memory().await;
        let key = click("signup", "/pricing");

        for expected in 1..=5 {
            let counter = ButtonClick::increment(&key, &db).await.unwrap();
            assert_eq!(counter.count, expected);
        }

        let clicks = ButtonClick::list(&db).await.unwrap();
        assert_eq!(clicks, vec![clicked("signup", "/pricing", 5)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let db = memory().await;
        let key = click("signup", "/pricing");

        let tasks = (0..32).map(|_| {
            let db = db.clone();
            let key = key.clone();
            tokio::spawn(async move { ButtonClick::increment(&key, &db).await })
        });

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let clicks = ButtonClick::list(&db).await.unwrap();
        assert_eq!(clicks, vec![clicked("signup", "/pricing", 32)]);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_interfere() {
        let db = memory().await;

        ButtonClick::increment(&click("cta", "/home"), &db)
            .await
            .unwrap();
        ButtonClick::increment(&click("cta", "/about"), &db)
            .await
            .unwrap();
        ButtonClick::increment(&click("cta", "/about"), &db)
            .await
            .unwrap();

        let clicks = ButtonClick::list(&db).await.unwrap();
        assert_eq!(
            clicks,
            vec![clicked("cta", "/about", 2), clicked("cta", "/home", 1)]
        );
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let db = memory().await;

        assert!(ButtonClick::list(&db).await.unwrap().is_empty());
        assert!(PageView::list(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn button_clicks_are_listed_by_descending_count() {
        let db = memory().await;

        let hits = [("a", 2), ("b", 7), ("c", 1), ("d", 4), ("e", 4)];
        for (button, times) in hits {
            for _ in 0..times {
                ButtonClick::increment(&click(button, "/"), &db)
                    .await
                    .unwrap();
            }
        }

        let clicks = ButtonClick::list(&db).await.unwrap();
        assert_eq!(clicks.len(), hits.len());
        assert!(clicks
            .windows(2)
            .all(|pair| pair[0].count >= pair[1].count));
    }

    #[tokio::test]
    async fn most_clicked_button_comes_first() {
        let db = memory().await;

        for _ in 0..3 {
            ButtonClick::increment(&click("cta-1", "/home"), &db)
                .await
                .unwrap();
        }
        ButtonClick::increment(&click("cta-2", "/home"), &db)
            .await
            .unwrap();

        let clicks = ButtonClick::list(&db).await.unwrap();
        assert_eq!(
            clicks,
            vec![clicked("cta-1", "/home", 3), clicked("cta-2", "/home", 1)]
        );
    }

    #[tokio::test]
    async fn blank_key_fields_are_rejected_without_writing() {
        let db = memory().await;

        let err = ButtonClick::increment(&click("", "/home"), &db)
            .await
            .unwrap_err();
        assert!(matches!(err, CounterError::Validation { field: "buttonId", .. }));

        let err = ButtonClick::increment(&click("cta", "   "), &db)
            .await
            .unwrap_err();
        assert!(matches!(err, CounterError::Validation { field: "path", .. }));

        let err = PageView::increment(&PageViewKey::new(String::new()), &db)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(ButtonClick::list(&db).await.unwrap().is_empty());
        assert!(PageView::list(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_views_count_per_path() {
        let db = memory().await;

        for path in ["/", "/blog", "/", "/contact", "/"] {
            PageView::increment(&PageViewKey::new(path.to_string()), &db)
                .await
                .unwrap();
        }

        let mut views = PageView::list(&db).await.unwrap();
        views.sort_by(|a, b| a.path.cmp(&b.path));

        let counts: Vec<(&str, u64)> = views
            .iter()
            .map(|view| (view.path.as_str(), view.count))
            .collect();
        assert_eq!(counts, vec![("/", 3), ("/blog", 1), ("/contact", 1)]);
    }

    #[tokio::test]
    async fn unreachable_store_is_reported_as_unavailable() {
        let db = Database::new(Surreal::init(), Duration::from_secs(1));

        let err = ButtonClick::list(&db).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");

        let err = ButtonClick::increment(&click("cta", "/"), &db)
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");
    }
}
