use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{DEFAULT_DEVICE, DEFAULT_DTYPE};

/// Free-form keyed parameters, used both for driver options and per-request
/// generation parameters. A `null` value counts as "not provided".
pub type Params = serde_json::Map<String, Value>;

/// Construction arguments handed to a driver constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Target device, e.g. `"cpu"` or `"cuda:0"`.
    pub device: String,
    /// Target dtype, e.g. `"float32"`.
    pub dtype: String,
    /// Driver-specific options (voice packs, repo ids, language codes, ...).
    #[serde(default)]
    pub options: Params,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            dtype: DEFAULT_DTYPE.to_string(),
            options: Params::new(),
        }
    }
}

impl DriverConfig {
    pub fn new(device: impl Into<String>, dtype: impl Into<String>, options: Params) -> Self {
        Self {
            device: device.into(),
            dtype: dtype.into(),
            options,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Option as a string slice, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Merge further options in; later keys win.
    pub fn update(&mut self, options: Params) {
        self.options.extend(options);
    }
}

/// Merge option maps left to right. Later maps override earlier ones and
/// `None` entries are skipped.
pub fn merge_options<'a, I>(maps: I) -> Params
where
    I: IntoIterator<Item = Option<&'a Params>>,
{
    let mut merged = Params::new();
    for map in maps.into_iter().flatten() {
        for (k, v) in map {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}
