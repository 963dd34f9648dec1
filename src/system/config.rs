//! Runtime configuration.
//!
//! Configuration is a read-only key/value dictionary ([`Settings`]) with a
//! typed accessor layer ([`SystemConfig`]) for the keys the runtime
//! recognizes. Unknown keys are preserved untouched: `logger.*` and
//! application keys pass through to their consumers.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// Layer 3: Internal module imports
use crate::error::{Error, ErrorCode};
use crate::util::NodeId;

/// Recognized configuration keys.
pub mod keys {
    /// `default` enables TCP networking, `testing`/`disabled` skip it.
    pub const MIDDLEMAN_NETWORK_BACKEND: &str = "middleman.network-backend";
    /// Set of application identifiers accepted during handshakes.
    pub const MIDDLEMAN_APP_IDENTIFIERS: &str = "middleman.app-identifiers";
    /// Accepted but inert: no relay mesh is built.
    pub const MIDDLEMAN_ENABLE_AUTOMATIC_CONNECTIONS: &str =
        "middleman.enable-automatic-connections";
    /// Per-connection read budget per reactor turn.
    pub const MIDDLEMAN_MAX_CONSECUTIVE_READS: &str = "middleman.max-consecutive-reads";
    /// Idle period after which a heartbeat is emitted.
    pub const MIDDLEMAN_HEARTBEAT_INTERVAL: &str = "middleman.heartbeat-interval";
    /// Inbound-silence deadline after which a peer is declared dead.
    pub const MIDDLEMAN_CONNECTION_TIMEOUT: &str = "middleman.connection-timeout";
    /// Schedule utility actors instead of running them on own threads.
    pub const MIDDLEMAN_ATTACH_UTILITY_ACTORS: &str = "middleman.attach-utility-actors";
    /// Messages an actor may consume per resume slice.
    pub const SCHEDULER_MAX_THROUGHPUT: &str = "scheduler.max-throughput";
    /// Scheduler backend identifier.
    pub const SCHEDULER_POLICY: &str = "scheduler.policy";
    /// Worker-thread count; defaults to the available parallelism.
    pub const SCHEDULER_MAX_THREADS: &str = "scheduler.max-threads";
    /// Stable node id override (32 hex characters).
    pub const HOST_ID: &str = "host-id";
}

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Duration(Duration),
    List(Vec<ConfigValue>),
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<usize> for ConfigValue {
    fn from(value: usize) -> Self {
        ConfigValue::Int(value as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<Duration> for ConfigValue {
    fn from(value: Duration) -> Self {
        ConfigValue::Duration(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        ConfigValue::List(value.into_iter().map(ConfigValue::Str).collect())
    }
}

/// Parse `"250ms"`, `"10s"`, `"1min"`, `"500us"` into a duration.
fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    let split = input.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = input.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit.trim() {
        "us" => Some(Duration::from_micros(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "min" => Some(Duration::from_secs(amount * 60)),
        _ => None,
    }
}

/// Read-only key/value dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    values: HashMap<String, ConfigValue>,
}

impl Settings {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Boolean with default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Bool(value)) => *value,
            _ => default,
        }
    }

    /// Integer with default.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(ConfigValue::Int(value)) => *value,
            _ => default,
        }
    }

    /// Non-negative integer with default.
    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        match self.values.get(key) {
            Some(ConfigValue::Int(value)) if *value >= 0 => *value as usize,
            _ => default,
        }
    }

    /// Borrowed string, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ConfigValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Duration from a `Duration`, an integer (milliseconds), or a
    /// suffixed string (`"250ms"`, `"10s"`, `"1min"`).
    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        match self.values.get(key)? {
            ConfigValue::Duration(value) => Some(*value),
            ConfigValue::Int(ms) if *ms >= 0 => Some(Duration::from_millis(*ms as u64)),
            ConfigValue::Str(text) => parse_duration(text),
            _ => None,
        }
    }

    /// String list, if present.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        match self.values.get(key)? {
            ConfigValue::List(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        ConfigValue::Str(value) => Some(value.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            ConfigValue::Str(value) => Some(vec![value.clone()]),
            _ => None,
        }
    }

    /// Load a dictionary from a JSON document; nested objects flatten into
    /// dotted keys (`{"scheduler": {"max-throughput": 500}}` becomes
    /// `scheduler.max-throughput`).
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let root: JsonValue = serde_json::from_str(input).map_err(|err| {
            Error::with_context(ErrorCode::InvalidArgument, format!("invalid JSON: {err}"))
        })?;
        let JsonValue::Object(map) = root else {
            return Err(Error::with_context(
                ErrorCode::InvalidArgument,
                "top-level JSON value must be an object",
            ));
        };
        let mut settings = Settings::new();
        for (key, value) in map {
            flatten_json(&key, value, &mut settings);
        }
        Ok(settings)
    }
}

fn flatten_json(prefix: &str, value: JsonValue, out: &mut Settings) {
    match value {
        JsonValue::Object(map) => {
            for (key, value) in map {
                flatten_json(&format!("{prefix}.{key}"), value, out);
            }
        }
        JsonValue::Bool(value) => out.set(prefix, value),
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                out.set(prefix, int);
            } else if let Some(float) = number.as_f64() {
                out.set(prefix, float);
            }
        }
        JsonValue::String(text) => out.set(prefix, text),
        JsonValue::Array(items) => {
            let list: Vec<ConfigValue> = items
                .into_iter()
                .filter_map(|item| match item {
                    JsonValue::String(text) => Some(ConfigValue::Str(text)),
                    JsonValue::Bool(value) => Some(ConfigValue::Bool(value)),
                    JsonValue::Number(number) => number.as_i64().map(ConfigValue::Int),
                    _ => None,
                })
                .collect();
            out.values.insert(prefix.to_string(), ConfigValue::List(list));
        }
        JsonValue::Null => {}
    }
}

/// Typed accessor layer over [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    settings: Settings,
}

impl SystemConfig {
    /// Defaults for everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing dictionary.
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Builder-style insert.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.settings.set(key, value);
        self
    }

    /// The underlying dictionary (including unrecognized keys such as
    /// `logger.*`).
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Per-slice message budget (`scheduler.max-throughput`, default 300).
    pub fn max_throughput(&self) -> usize {
        self.settings.get_usize(keys::SCHEDULER_MAX_THROUGHPUT, 300)
    }

    /// Worker-thread count override (`scheduler.max-threads`).
    pub fn workers(&self) -> Option<usize> {
        match self.settings.get(keys::SCHEDULER_MAX_THREADS) {
            Some(ConfigValue::Int(value)) if *value > 0 => Some(*value as usize),
            _ => None,
        }
    }

    /// Scheduler backend identifier (`scheduler.policy`).
    pub fn scheduler_policy(&self) -> &str {
        self.settings.get_str(keys::SCHEDULER_POLICY).unwrap_or("stealing")
    }

    /// Network backend (`middleman.network-backend`, default `default`).
    pub fn network_backend(&self) -> &str {
        self.settings
            .get_str(keys::MIDDLEMAN_NETWORK_BACKEND)
            .unwrap_or("default")
    }

    /// Application identifiers advertised in handshakes.
    pub fn app_identifiers(&self) -> Vec<String> {
        self.settings
            .get_str_list(keys::MIDDLEMAN_APP_IDENTIFIERS)
            .unwrap_or_else(|| vec!["hive-rt".to_string()])
    }

    /// Idle-heartbeat period, if configured.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.settings.get_duration(keys::MIDDLEMAN_HEARTBEAT_INTERVAL)
    }

    /// Inbound-silence deadline, if configured.
    pub fn connection_timeout(&self) -> Option<Duration> {
        self.settings.get_duration(keys::MIDDLEMAN_CONNECTION_TIMEOUT)
    }

    /// Per-connection read budget per reactor turn (default 50).
    pub fn max_consecutive_reads(&self) -> usize {
        self.settings
            .get_usize(keys::MIDDLEMAN_MAX_CONSECUTIVE_READS, 50)
    }

    /// Whether on-demand connections are requested (accepted but inert).
    pub fn automatic_connections(&self) -> bool {
        self.settings
            .get_bool(keys::MIDDLEMAN_ENABLE_AUTOMATIC_CONNECTIONS, false)
    }

    /// Whether utility actors should be scheduled instead of detached.
    pub fn attach_utility_actors(&self) -> bool {
        self.settings
            .get_bool(keys::MIDDLEMAN_ATTACH_UTILITY_ACTORS, false)
    }

    /// Stable node-id override (`host-id`, 32 hex characters).
    pub fn host_id(&self) -> Option<NodeId> {
        self.settings.get_str(keys::HOST_ID).and_then(NodeId::from_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SystemConfig::new();
        assert_eq!(config.max_throughput(), 300);
        assert_eq!(config.network_backend(), "default");
        assert_eq!(config.app_identifiers(), vec!["hive-rt".to_string()]);
        assert_eq!(config.heartbeat_interval(), None);
        assert_eq!(config.max_consecutive_reads(), 50);
        assert!(!config.automatic_connections());
    }

    #[test]
    fn typed_accessors_read_settings() {
        let config = SystemConfig::new()
            .set(keys::SCHEDULER_MAX_THROUGHPUT, 100usize)
            .set(keys::MIDDLEMAN_HEARTBEAT_INTERVAL, "250ms")
            .set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
        assert_eq!(config.max_throughput(), 100);
        assert_eq!(
            config.heartbeat_interval(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.network_backend(), "disabled");
    }

    #[test]
    fn duration_parsing_variants() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("1min"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("fast"), None);
    }

    #[test]
    fn json_flattening() {
        let settings = Settings::from_json_str(
            r#"{
                "scheduler": {"max-throughput": 500},
                "middleman": {"app-identifiers": ["a", "b"]},
                "logger": {"verbosity": "debug"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.get_int("scheduler.max-throughput", 0), 500);
        assert_eq!(
            settings.get_str_list("middleman.app-identifiers"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(settings.get_str("logger.verbosity"), Some("debug"));
    }

    #[test]
    fn invalid_json_is_a_typed_error() {
        let err = Settings::from_json_str("[1, 2]").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
