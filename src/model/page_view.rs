use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{define_counter, define_key};

/// How many times a page was viewed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageView {
    pub path: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, new)]
pub struct PageViewKey {
    #[serde(default)]
    pub path: String,
}

define_key!(PageViewKey { path => "path" });

define_counter!("page_views": PageView, key = PageViewKey, order = Unspecified);
