/// Implements [CounterKey](crate::counter::CounterKey) for a key struct.
///
/// Each field is listed with the name it is serialized and stored under. The order of the
/// fields is the order of the components of the record id.
///
/// # Example
///
/// ```rust,ignore
/// define_key!(ButtonClickKey { button_id => "buttonId", path => "path" });
/// ```
#[macro_export]
macro_rules! define_key {
    ($key:ty { $($field:ident => $name:literal),+ $(,)? }) => {
        impl $crate::counter::CounterKey for $key {
            const FIELDS: &'static [&'static str] = &[$($name),+];

            fn validate(&self) -> $crate::counter::Result<()> {
                $(
                    snafu::ensure!(
                        !self.$field.trim().is_empty(),
                        $crate::counter::ValidationSnafu { field: $name }
                    );
                )+
                Ok(())
            }
        }
    };
}

/// Implements [Counter](crate::counter::Counter) for a model and adds `increment` and `list` to it.
///
/// # Syntax
/// ```text
/// "table": Model, key = KeyType, order = ListOrderVariant
/// ```
///
/// # Example
///
/// ```rust,ignore
/// define_counter!("page_views": PageView, key = PageViewKey, order = Unspecified);
///
/// PageView::increment(&PageViewKey::new("/blog".into()), &db).await?;
/// let views = PageView::list(&db).await?;
/// ```
#[macro_export]
macro_rules! define_counter {
    ($table:literal : $model:ty, key = $key:ty, order = $order:ident) => {
        impl $crate::counter::Counter for $model {
            type Key = $key;

            const ORDER: $crate::counter::ListOrder = $crate::counter::ListOrder::$order;

            fn table() -> &'static str {
                $table
            }
        }

        impl $model {
            /// Add one to the counter identified by `key`, creating it on first use.
            pub async fn increment(
                key: &$key, db: impl Into<&$crate::database::Database>,
            ) -> $crate::counter::Result<Self> {
                $crate::counter::increment::<Self>(key, db.into()).await
            }

            /// Every counter of this kind.
            pub async fn list(
                db: impl Into<&$crate::database::Database>,
            ) -> $crate::counter::Result<Vec<Self>> {
                $crate::counter::list::<Self>(db.into()).await
            }
        }
    };
}
