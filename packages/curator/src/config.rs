use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use link_resolver::ResolverConfig;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cycle::CycleSettings;
use crate::models::Channel;
use crate::sources::SOURCE_NAMES;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Queue entry lifetime in hours: at least an hour, at most a year.
const QUEUE_TTL_RANGE: std::ops::RangeInclusive<i64> = 1..=8760;

/// A delivery channel as configured: `name:daily_limit` plus an optional
/// chat id from `TELEGRAM_CHAT_<NAME>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub name: String,
    pub daily_limit: u32,
    pub chat_id: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_ttl_hours: i64,
    pub high_priority_ratio: f64,
    pub channels: Vec<ChannelConfig>,
    /// Enabled discovery sources, in polling order
    pub sources: Vec<String>,
    pub telegram_bot_token: Option<String>,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
    pub resolve_concurrency: usize,
    pub resolve_timeout_secs: u64,
    pub cycle_deadline_secs: u64,
    pub discovery_limit: usize,
    pub resolve_batch_limit: usize,
    pub salary_high_threshold: i64,
    pub employer_directory: Option<PathBuf>,
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let channels = parse_channels(&var("CHANNELS").unwrap_or_else(|| "free:5,paid:15".to_string()))
            .context("CHANNELS must look like name:limit[,name:limit...]")?
            .into_iter()
            .map(|(name, daily_limit)| {
                let chat_id = var(&format!("TELEGRAM_CHAT_{}", name.to_uppercase()));
                ChannelConfig {
                    name,
                    daily_limit,
                    chat_id,
                }
            })
            .collect();

        let high_priority_ratio: f64 = parse_or(&var, "HIGH_PRIORITY_RATIO", 0.75)?;
        if !(0.0..=1.0).contains(&high_priority_ratio) {
            bail!("HIGH_PRIORITY_RATIO must be between 0 and 1");
        }

        let queue_ttl_hours: i64 = parse_or(&var, "QUEUE_TTL_HOURS", 72)?;
        if !QUEUE_TTL_RANGE.contains(&queue_ttl_hours) {
            bail!(
                "QUEUE_TTL_HOURS must be between {} and {}",
                QUEUE_TTL_RANGE.start(),
                QUEUE_TTL_RANGE.end()
            );
        }

        let sources = parse_sources(&var("SOURCES").unwrap_or_else(|| SOURCE_NAMES.join(",")))?;

        Ok(Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/jobs.db?mode=rwc".to_string()),
            queue_ttl_hours,
            high_priority_ratio,
            channels,
            sources,
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            request_timeout_secs: parse_or(&var, "REQUEST_TIMEOUT_SECS", 15)?,
            requests_per_second: parse_or(&var, "REQUESTS_PER_SECOND", 2)?,
            resolve_concurrency: parse_or(&var, "RESOLVE_CONCURRENCY", 4)?,
            resolve_timeout_secs: parse_or(&var, "RESOLVE_TIMEOUT_SECS", 60)?,
            cycle_deadline_secs: parse_or(&var, "CYCLE_DEADLINE_SECS", 1800)?,
            discovery_limit: parse_or(&var, "DISCOVERY_LIMIT", 30)?,
            resolve_batch_limit: parse_or(&var, "RESOLVE_BATCH_LIMIT", 20)?,
            salary_high_threshold: parse_or(&var, "SALARY_HIGH_THRESHOLD", 4000)?,
            employer_directory: var("EMPLOYER_DIRECTORY").map(PathBuf::from),
            user_agent: var("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_user_agent(self.user_agent.clone())
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_requests_per_second(self.requests_per_second)
            .with_concurrency(self.resolve_concurrency)
            .with_resolve_timeout(Duration::from_secs(self.resolve_timeout_secs))
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .map(|c| Channel::new(c.name.clone(), c.daily_limit).with_high_ratio(self.high_priority_ratio))
            .collect()
    }

    /// Channel name to chat id, for channels that have one.
    pub fn telegram_chats(&self) -> HashMap<String, String> {
        self.channels
            .iter()
            .filter_map(|c| c.chat_id.clone().map(|chat| (c.name.clone(), chat)))
            .collect()
    }

    pub fn queue_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.queue_ttl_hours)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            discovery_limit: self.discovery_limit,
            resolve_batch_limit: self.resolve_batch_limit,
            deadline: Duration::from_secs(self.cycle_deadline_secs),
            ..CycleSettings::default()
        }
    }
}

fn parse_or<T, V>(var: V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

/// Parse `name:limit[,name:limit...]`. Names are lowercased.
pub fn parse_channels(raw: &str) -> Result<Vec<(String, u32)>> {
    let mut channels: Vec<(String, u32)> = Vec::new();

    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((name, limit)) = part.split_once(':') else {
            bail!("channel {:?} is missing a daily limit", part);
        };
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            bail!("channel {:?} has an empty name", part);
        }
        if channels.iter().any(|(existing, _)| existing == &name) {
            bail!("channel {:?} is listed twice", name);
        }
        let limit: u32 = limit
            .trim()
            .parse()
            .with_context(|| format!("channel {:?} has an invalid daily limit", name))?;
        channels.push((name, limit));
    }

    Ok(channels)
}

/// Parse a comma-separated list of known source names. Names are
/// lowercased; repeats are dropped.
pub fn parse_sources(raw: &str) -> Result<Vec<String>> {
    let mut sources: Vec<String> = Vec::new();

    for name in raw.split(',').map(|n| n.trim().to_lowercase()) {
        if name.is_empty() || sources.contains(&name) {
            continue;
        }
        if !SOURCE_NAMES.contains(&name.as_str()) {
            bail!(
                "SOURCES entry {:?} is not one of {}",
                name,
                SOURCE_NAMES.join(", ")
            );
        }
        sources.push(name);
    }

    if sources.is_empty() {
        bail!("SOURCES must name at least one source");
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.database_url, "sqlite://data/jobs.db?mode=rwc");
        assert_eq!(config.queue_ttl_hours, 72);
        assert_eq!(config.high_priority_ratio, 0.75);
        assert_eq!(config.requests_per_second, 2);
        assert_eq!(config.salary_high_threshold, 4000);
        assert_eq!(
            config.channels,
            vec![
                ChannelConfig { name: "free".into(), daily_limit: 5, chat_id: None },
                ChannelConfig { name: "paid".into(), daily_limit: 15, chat_id: None },
            ]
        );
        assert!(config.telegram_bot_token.is_none());
        assert_eq!(config.sources, vec!["remoteok", "himalayas", "weworkremotely"]);
    }

    #[test]
    fn test_sources_are_validated() {
        let config = config(&[("SOURCES", " Himalayas, remoteok,himalayas ")]).unwrap();
        assert_eq!(config.sources, vec!["himalayas", "remoteok"]);

        assert!(parse_sources("remoteok,linkedin").is_err());
        assert!(parse_sources(" , ").is_err());
    }

    #[test]
    fn test_channel_chat_ids_come_from_per_channel_vars() {
        let config = config(&[
            ("CHANNELS", "Free:4, vip:10"),
            ("TELEGRAM_CHAT_FREE", "@free_jobs"),
            ("TELEGRAM_CHAT_VIP", "-100123"),
        ])
        .unwrap();

        let chats = config.telegram_chats();
        assert_eq!(chats.get("free").map(String::as_str), Some("@free_jobs"));
        assert_eq!(chats.get("vip").map(String::as_str), Some("-100123"));

        let channels = config.channels();
        assert_eq!(channels[0].name, "free");
        assert_eq!(channels[0].daily_limit, 4);
        assert_eq!(channels[0].high_ratio, 0.75);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config(&[("QUEUE_TTL_HOURS", "soon")]).is_err());
        assert!(config(&[("HIGH_PRIORITY_RATIO", "1.5")]).is_err());
        assert!(config(&[("CHANNELS", "free")]).is_err());
        assert!(config(&[("CHANNELS", "free:5,free:6")]).is_err());
    }

    #[test]
    fn test_queue_ttl_must_be_within_a_year() {
        assert!(config(&[("QUEUE_TTL_HOURS", "0")]).is_err());
        assert!(config(&[("QUEUE_TTL_HOURS", "-1")]).is_err());
        assert!(config(&[("QUEUE_TTL_HOURS", "999999999999999")]).is_err());

        let config = config(&[("QUEUE_TTL_HOURS", "8760")]).unwrap();
        assert_eq!(config.queue_ttl(), chrono::Duration::days(365));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config(&[("REQUESTS_PER_SECOND", "  ")]).unwrap();
        assert_eq!(config.requests_per_second, 2);
    }
}
