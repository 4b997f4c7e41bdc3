//! 日志初始化
//!
//! RUST_LOG 存在时完全接管过滤规则；否则使用配置的级别，并把 HTTP / RPC
//! 依赖的噪声压到 warn。

use anyhow::{bail, Context, Result};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 依赖库的默认级别
const QUIET_TARGETS: &[&str] = &["hyper=warn", "reqwest=warn", "rustls=warn", "ethers_providers=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => bail!("Unknown log format: {}", other),
        }
    }
}

/// 配置级别 + 依赖静音规则
pub fn filter_directives(level: &str) -> String {
    let mut directives = vec![format!("walletcore={}", level), level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|d| d.to_string()));
    directives.join(",")
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(filter_directives(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))
}

/// 安装全局订阅者；进程内只能成功一次
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let timer = ChronoUtc::rfc_3339();

    match LogFormat::parse(&config.format)? {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_timer(timer).with_current_span(false))
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_timer(timer).with_target(true))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}

pub fn init_default_logging() {
    if let Err(e) = init_logging(&LoggingConfig::default()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        let _ = tracing_subscriber::fmt::try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty").unwrap(), LogFormat::Text);
        assert!(LogFormat::parse("xml").is_err());
    }

    #[test]
    fn test_filter_quiets_transport_crates() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("walletcore=debug,debug"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_unknown_format_is_rejected_before_install() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "xml".to_string(),
        };
        assert!(init_logging(&config).is_err());
    }
}
