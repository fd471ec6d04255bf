/// 환경 변수 기반 서비스 설정
// region:    --- Imports
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Config
#[derive(Debug, Error)]
#[error("환경 변수 {name} 값이 올바르지 않습니다: {value}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 없으면 인메모리 저장소로 동작
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// 없으면 로그 전용 메일러로 동작
    pub kafka_brokers: Option<String>,
    pub winner_mail_topic: String,
    pub bind_addr: String,
    pub scheduler: SchedulerConfig,
    pub max_bid_retries: u32,
    pub channel_buffer: usize,
}

/// 스케줄러 설정
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// 한 틱 안에서 경매 하나에 허용되는 최대 처리 시간
    pub item_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            item_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            kafka_brokers: None,
            winner_mail_topic: "winner-emails".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            scheduler: SchedulerConfig::default(),
            max_bid_retries: 100,
            channel_buffer: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 조회 함수로부터 설정 생성
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let tick_ms = parse_or(&lookup, "SCHEDULER_TICK_MS", 1000u64)?;
        let item_timeout_ms = parse_or(&lookup, "SCHEDULER_ITEM_TIMEOUT_MS", 5000u64)?;
        if tick_ms == 0 {
            return Err(ConfigError {
                name: "SCHEDULER_TICK_MS",
                value: tick_ms.to_string(),
            });
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            kafka_brokers: non_empty("KAFKA_BROKERS"),
            winner_mail_topic: non_empty("WINNER_MAIL_TOPIC")
                .unwrap_or(defaults.winner_mail_topic),
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            scheduler: SchedulerConfig {
                tick_interval: Duration::from_millis(tick_ms),
                item_timeout: Duration::from_millis(item_timeout_ms),
            },
            max_bid_retries: parse_or(&lookup, "MAX_BID_RETRIES", defaults.max_bid_retries)?,
            channel_buffer: parse_or(&lookup, "CHANNEL_BUFFER", defaults.channel_buffer)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError { name, value: raw }),
        _ => Ok(default),
    }
}
// endregion: --- Config
