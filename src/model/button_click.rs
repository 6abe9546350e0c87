use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{define_counter, define_key};

/// How many times a button was clicked on a given page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonClick {
    pub button_id: String,
    pub path: String,
    #[serde(default)]
    pub count: u64,
}

/// Identifies a [ButtonClick]. Absent fields deserialize as empty strings so that validation reports them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, new)]
#[serde(rename_all = "camelCase")]
pub struct ButtonClickKey {
    #[serde(default)]
    pub button_id: String,
    #[serde(default)]
    pub path: String,
}

define_key!(ButtonClickKey { button_id => "buttonId", path => "path" });

define_counter!("button_clicks": ButtonClick, key = ButtonClickKey, order = CountDescending);
