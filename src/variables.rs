use std::path::Path;

use chrono::Local;
use serde_json::{Map, Value};

use crate::template::load_optional;

pub const VARIABLES_FILE: &str = "variables.json";

pub type Variables = Map<String, Value>;

/// Reads `variables.json` from `dir`. A missing, unreadable or non-object
/// file yields an empty mapping.
pub fn load_variables(dir: &Path) -> Variables {
    load_optional(&dir.join(VARIABLES_FILE))
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

/// Job-scope auto variables, computed fresh on every call.
pub fn job_auto_variables() -> Variables {
    let mut auto = Variables::new();
    auto.insert(
        "asctime".into(),
        Value::String(Local::now().format("%a %b %e %H:%M:%S %Y").to_string()),
    );
    auto
}

/// Overlays job, recipient and auto variables; later layers win.
pub fn resolve(job: &Variables, recipient: &Variables, auto: &Variables) -> Variables {
    let mut merged = job.clone();
    for layer in [recipient, auto] {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
