//! Forwarder configuration.
//!
//! All settings come from `KFWD_*` environment variables with validated
//! defaults. Malformed or out-of-range values are collected and reported
//! together in a single configuration error, so an operator sees every
//! problem in one pass instead of fixing them one restart at a time.

use std::time::Duration;

use crate::decode::Encoding;
use crate::destination::parse_destination;
use crate::error::ForwardError;

pub const DEFAULT_CONSUMER_GROUP: &str = "kplay-forwarder";

/// Validated runtime settings for the forwarding service.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Bootstrap broker list, `host:port[,host:port...]`.
    pub brokers: String,
    /// Topic to consume.
    pub topic: String,
    /// Durable consumer group id.
    pub consumer_group: String,
    /// Destination spec, `bucket[/prefix]`.
    pub destination: String,
    /// Payload encoding handed to the decoder.
    pub encoding: Encoding,
    /// Records fetched per pipeline iteration.
    pub fetch_batch_size: usize,
    /// Concurrent upload workers.
    pub upload_workers: usize,
    /// In-flight message bound between fetch and upload completion.
    pub flow_capacity: usize,
    pub shutdown_timeout: Duration,
    /// Bound on a single fetch call.
    pub fetch_poll_timeout: Duration,
    /// Idle wait when no flow tokens are available.
    pub poll_sleep: Duration,
    /// Bound on a single upload attempt.
    pub upload_timeout: Duration,
    /// When false, outcome rows are counted but never serialized.
    pub upload_reports: bool,
    pub report_batch_size: usize,
    pub run_health_server: bool,
    pub server_host: String,
    pub server_port: u16,
    /// Overrides the per-record destination key when set.
    pub fixed_object_key: Option<String>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            topic: String::new(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            destination: String::new(),
            encoding: Encoding::Raw,
            fetch_batch_size: 50,
            upload_workers: 50,
            flow_capacity: 100,
            shutdown_timeout: Duration::from_millis(30_000),
            fetch_poll_timeout: Duration::from_millis(10_000),
            poll_sleep: Duration::from_millis(5_000),
            upload_timeout: Duration::from_millis(10_000),
            upload_reports: false,
            report_batch_size: 5_000,
            run_health_server: false,
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            fixed_object_key: None,
        }
    }
}

impl ForwarderConfig {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ForwardError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load and validate configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ForwardError> {
        let mut reader = EnvReader {
            lookup: &lookup,
            errors: Vec::new(),
        };

        let brokers = reader.required("KFWD_BROKERS");
        let topic = reader.required("KFWD_TOPIC");
        let destination = reader.required("KFWD_DESTINATION");
        if !destination.is_empty()
            && let Err(err) = parse_destination(&destination)
        {
            reader.errors.push(format!("KFWD_DESTINATION: {err}"));
        }

        let consumer_group = reader
            .optional("KFWD_CONSUMER_GROUP")
            .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string());
        if !(5..=255).contains(&consumer_group.len()) {
            reader.errors.push(format!(
                "KFWD_CONSUMER_GROUP: length {} out of range [5, 255]",
                consumer_group.len()
            ));
        }

        let encoding = match reader.optional("KFWD_ENCODING") {
            None => Encoding::Raw,
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                reader.errors.push(format!("KFWD_ENCODING: {err}"));
                Encoding::Raw
            }),
        };

        let fetch_batch_size = reader.ranged("KFWD_FETCH_BATCH_SIZE", 50, 1, 1_000) as usize;
        let upload_workers = reader.ranged("KFWD_UPLOAD_WORKERS", 50, 1, 500) as usize;
        let flow_capacity = reader.ranged("KFWD_FLOW_CAPACITY", 100, 1, 10_000) as usize;
        let shutdown_timeout_ms = reader.ranged("KFWD_SHUTDOWN_TIMEOUT_MS", 30_000, 10_000, 60_000);
        let fetch_poll_timeout_ms =
            reader.ranged("KFWD_FETCH_POLL_TIMEOUT_MS", 10_000, 1_000, 60_000);
        let poll_sleep_ms = reader.ranged("KFWD_POLL_SLEEP_MS", 5_000, 0, 1_800_000);
        let upload_timeout_ms = reader.ranged("KFWD_UPLOAD_TIMEOUT_MS", 10_000, 1_000, 60_000);
        let upload_reports = reader.flag("KFWD_UPLOAD_REPORTS", false);
        let report_batch_size = reader.ranged("KFWD_REPORT_BATCH_SIZE", 5_000, 1_000, 20_000) as usize;
        let run_health_server = reader.flag("KFWD_RUN_HEALTH_SERVER", false);
        let server_host = reader
            .optional("KFWD_SERVER_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let server_port = reader.port("KFWD_SERVER_PORT", 8080);
        let fixed_object_key = reader.optional("KFWD_OBJECT_KEY");

        if !reader.errors.is_empty() {
            return Err(ForwardError::Configuration {
                reasons: reader.errors,
            });
        }

        Ok(Self {
            brokers,
            topic,
            consumer_group,
            destination,
            encoding,
            fetch_batch_size,
            upload_workers,
            flow_capacity,
            shutdown_timeout: Duration::from_millis(shutdown_timeout_ms),
            fetch_poll_timeout: Duration::from_millis(fetch_poll_timeout_ms),
            poll_sleep: Duration::from_millis(poll_sleep_ms),
            upload_timeout: Duration::from_millis(upload_timeout_ms),
            upload_reports,
            report_batch_size,
            run_health_server,
            server_host,
            server_port,
            fixed_object_key,
        })
    }
}

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    errors: Vec<String>,
}

impl EnvReader<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, name: &str) -> String {
        match self.optional(name) {
            Some(value) => value,
            None => {
                self.errors.push(format!("{name}: required but not set"));
                String::new()
            }
        }
    }

    fn ranged(&mut self, name: &str, default: u64, min: u64, max: u64) -> u64 {
        match self.optional(name) {
            None => default,
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if (min..=max).contains(&value) => value,
                Ok(value) => {
                    self.errors
                        .push(format!("{name}: {value} out of range [{min}, {max}]"));
                    default
                }
                Err(_) => {
                    self.errors
                        .push(format!("{name}: `{raw}` is not a valid number"));
                    default
                }
            },
        }
    }

    fn flag(&mut self, name: &str, default: bool) -> bool {
        match self.optional(name) {
            None => default,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    self.errors
                        .push(format!("{name}: `{other}` is not a valid boolean"));
                    default
                }
            },
        }
    }

    fn port(&mut self, name: &str, default: u16) -> u16 {
        match self.optional(name) {
            None => default,
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) => value,
                Err(_) => {
                    self.errors
                        .push(format!("{name}: `{raw}` is not a valid port"));
                    default
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("KFWD_BROKERS", "localhost:9092"),
            ("KFWD_TOPIC", "orders"),
            ("KFWD_DESTINATION", "bucket/prefix"),
        ])
    }

    fn load(vars: HashMap<&'static str, &'static str>) -> Result<ForwarderConfig, ForwardError> {
        ForwarderConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = load(base_vars()).unwrap();
        assert_eq!(config.consumer_group, DEFAULT_CONSUMER_GROUP);
        assert_eq!(config.fetch_batch_size, 50);
        assert_eq!(config.upload_workers, 50);
        assert_eq!(config.flow_capacity, 100);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.report_batch_size, 5_000);
        assert!(!config.upload_reports);
        assert!(!config.run_health_server);
        assert_eq!(config.server_port, 8080);
    }

    #[test]
    fn missing_required_vars_are_all_reported() {
        let err = load(HashMap::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("KFWD_BROKERS"));
        assert!(message.contains("KFWD_TOPIC"));
        assert!(message.contains("KFWD_DESTINATION"));
    }

    #[test]
    fn malformed_values_are_aggregated_not_fail_fast() {
        let mut vars = base_vars();
        vars.insert("KFWD_FETCH_BATCH_SIZE", "0");
        vars.insert("KFWD_UPLOAD_WORKERS", "many");
        vars.insert("KFWD_UPLOAD_REPORTS", "maybe");
        let err = load(vars).unwrap_err();
        let ForwardError::Configuration { reasons } = err else {
            panic!("expected configuration error");
        };
        assert_eq!(reasons.len(), 3);
        assert!(reasons.iter().any(|r| r.contains("KFWD_FETCH_BATCH_SIZE")));
        assert!(reasons.iter().any(|r| r.contains("KFWD_UPLOAD_WORKERS")));
        assert!(reasons.iter().any(|r| r.contains("KFWD_UPLOAD_REPORTS")));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let mut vars = base_vars();
        vars.insert("KFWD_FETCH_BATCH_SIZE", "1000");
        vars.insert("KFWD_SHUTDOWN_TIMEOUT_MS", "10000");
        vars.insert("KFWD_POLL_SLEEP_MS", "0");
        let config = load(vars).unwrap();
        assert_eq!(config.fetch_batch_size, 1_000);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_sleep, Duration::ZERO);
    }

    #[test]
    fn short_consumer_group_is_rejected() {
        let mut vars = base_vars();
        vars.insert("KFWD_CONSUMER_GROUP", "abc");
        let err = load(vars).unwrap_err();
        assert!(err.to_string().contains("KFWD_CONSUMER_GROUP"));
    }

    #[test]
    fn malformed_destination_is_a_config_error() {
        let mut vars = base_vars();
        vars.insert("KFWD_DESTINATION", "/prefix-only");
        let err = load(vars).unwrap_err();
        assert!(err.to_string().contains("bucket name is empty"));
    }

    #[test]
    fn encoding_and_fixed_key_are_parsed() {
        let mut vars = base_vars();
        vars.insert("KFWD_ENCODING", "json");
        vars.insert("KFWD_OBJECT_KEY", "demo.txt");
        let config = load(vars).unwrap();
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.fixed_object_key.as_deref(), Some("demo.txt"));
    }
}
