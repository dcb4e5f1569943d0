//! Process configuration from `PRICEWATCH_*` environment variables.
//!
//! Every setting has a default; only malformed values are errors. Absent
//! `REDIS_URL` / `DATABASE_URL` select the in-memory backends.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use pricewatch_extraction::engine::DEFAULT_USER_AGENT;
use pricewatch_extraction::{ExtractorConfig, RetryPolicy};
use pricewatch_monitor::ScheduleConfig;
use pricewatch_notify::rate_limit::DEFAULT_MAX_PER_HOUR;

use crate::event_bus::DEFAULT_STREAM_KEY;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub fixed_delay: Duration,
    pub max_concurrent: usize,
}

impl MonitorSettings {
    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            initial_delay: self.initial_delay,
            fixed_delay: self.fixed_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl ScrapeSettings {
    pub fn extractor(&self) -> ExtractorConfig {
        ExtractorConfig {
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
            retry: RetryPolicy::fixed(self.max_retries, self.backoff),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub monitor: MonitorSettings,
    pub scrape: ScrapeSettings,
    pub product_registry_url: Option<String>,
    pub user_registry_url: Option<String>,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub consumer_group: String,
    /// Redis stream the pipeline events go through.
    pub event_stream: String,
    /// Fixed consumer name within the group; random per process when unset.
    pub consumer_name: Option<String>,
    pub rate_limit_per_hour: u32,
    /// `None` keeps mail in the process (recording transport).
    pub smtp: Option<SmtpSettings>,
    pub mail_from_address: String,
    pub mail_from_name: String,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let monitor = MonitorSettings {
            enabled: env.parse("PRICEWATCH_MONITOR_ENABLED", true, parse_bool)?,
            initial_delay: env.secs("PRICEWATCH_MONITOR_INITIAL_DELAY_SECS", 60)?,
            fixed_delay: env.secs("PRICEWATCH_MONITOR_FIXED_DELAY_SECS", 300)?,
            max_concurrent: env.parse(
                "PRICEWATCH_MONITOR_MAX_CONCURRENT",
                pricewatch_monitor::orchestrator::DEFAULT_MAX_CONCURRENT,
                positive::<usize>,
            )?,
        };

        let scrape = ScrapeSettings {
            timeout: Duration::from_millis(env.parse(
                "PRICEWATCH_SCRAPE_TIMEOUT_MS",
                10_000,
                positive::<u64>,
            )?),
            user_agent: env
                .string("PRICEWATCH_SCRAPE_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            max_retries: env.parse("PRICEWATCH_SCRAPE_MAX_RETRIES", 3, number::<u32>)?,
            backoff: Duration::from_millis(env.parse(
                "PRICEWATCH_SCRAPE_BACKOFF_MS",
                2_000,
                number::<u64>,
            )?),
        };

        let mail_from_address = env
            .string("PRICEWATCH_MAIL_FROM")
            .unwrap_or_else(|| "noreply@pricewatcher.com".to_string());
        let mail_from_name = env
            .string("PRICEWATCH_MAIL_FROM_NAME")
            .unwrap_or_else(|| "Price Watcher".to_string());

        let smtp = match env.string("PRICEWATCH_SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: env.parse("PRICEWATCH_SMTP_PORT", 587, positive::<u16>)?,
                username: env.string("PRICEWATCH_SMTP_USERNAME"),
                password: env.string("PRICEWATCH_SMTP_PASSWORD"),
                from_address: mail_from_address.clone(),
                from_name: mail_from_name.clone(),
            }),
            None => None,
        };

        Ok(Self {
            monitor,
            scrape,
            product_registry_url: env.string("PRICEWATCH_PRODUCT_REGISTRY_URL"),
            user_registry_url: env.string("PRICEWATCH_USER_REGISTRY_URL"),
            redis_url: env.string("REDIS_URL"),
            database_url: env.string("DATABASE_URL"),
            consumer_group: env
                .string("PRICEWATCH_CONSUMER_GROUP")
                .unwrap_or_else(|| "notification-service".to_string()),
            event_stream: env
                .string("PRICEWATCH_EVENT_STREAM")
                .unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string()),
            consumer_name: env.string("PRICEWATCH_CONSUMER_NAME"),
            rate_limit_per_hour: env.parse(
                "PRICEWATCH_RATE_LIMIT_PER_HOUR",
                DEFAULT_MAX_PER_HOUR,
                number::<u32>,
            )?,
            smtp,
            mail_from_address,
            mail_from_name,
            bind_addr: env.parse(
                "PRICEWATCH_BIND_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8080)),
                |raw| raw.parse::<SocketAddr>().map_err(|e| e.to_string()),
            )?,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(
        &self,
        name: &'static str,
        default: T,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, ConfigError> {
        match self.string(name) {
            None => Ok(default),
            Some(raw) => parse(&raw).map_err(|reason| ConfigError::Invalid {
                name,
                value: raw,
                reason,
            }),
        }
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(name, default, number::<u64>)
            .map(Duration::from_secs)
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean".to_string()),
    }
}

fn number<T: FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| e.to_string())
}

fn positive<T: FromStr + Default + PartialEq>(raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let value = number::<T>(raw)?;
    if value == T::default() {
        return Err("must be greater than zero".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_select_in_memory_backends() {
        let cfg = config(&[]).unwrap();

        assert!(cfg.monitor.enabled);
        assert_eq!(cfg.monitor.initial_delay, Duration::from_secs(60));
        assert_eq!(cfg.monitor.fixed_delay, Duration::from_secs(300));
        assert_eq!(cfg.scrape.timeout, Duration::from_secs(10));
        assert_eq!(cfg.scrape.extractor().retry, RetryPolicy::default());
        assert_eq!(cfg.rate_limit_per_hour, 10);
        assert_eq!(cfg.redis_url, None);
        assert_eq!(cfg.event_stream, "pricewatch:events");
        assert_eq!(cfg.consumer_name, None);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.smtp, None);
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("PRICEWATCH_MONITOR_ENABLED", "false"),
            ("PRICEWATCH_MONITOR_FIXED_DELAY_SECS", "30"),
            ("PRICEWATCH_RATE_LIMIT_PER_HOUR", "3"),
            ("REDIS_URL", "redis://cache:6379"),
            ("PRICEWATCH_EVENT_STREAM", "staging:events"),
            ("PRICEWATCH_CONSUMER_NAME", "notifier-1"),
            ("PRICEWATCH_SMTP_HOST", "smtp.example.com"),
            ("PRICEWATCH_MAIL_FROM", "alerts@example.com"),
        ])
        .unwrap();

        assert!(!cfg.monitor.enabled);
        assert_eq!(cfg.monitor.schedule().fixed_delay, Duration::from_secs(30));
        assert_eq!(cfg.rate_limit_per_hour, 3);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(cfg.event_stream, "staging:events");
        assert_eq!(cfg.consumer_name.as_deref(), Some("notifier-1"));
        let smtp = cfg.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from_address, "alerts@example.com");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("DATABASE_URL", "  "), ("PRICEWATCH_SCRAPE_MAX_RETRIES", "")]).unwrap();
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.scrape.max_retries, 3);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[("PRICEWATCH_MONITOR_MAX_CONCURRENT", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "PRICEWATCH_MONITOR_MAX_CONCURRENT", .. }
        ));

        let err = config(&[("PRICEWATCH_MONITOR_MAX_CONCURRENT", "0")]).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        assert!(config(&[("PRICEWATCH_MONITOR_ENABLED", "maybe")]).is_err());
    }
}
