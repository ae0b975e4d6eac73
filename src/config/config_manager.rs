// src/config/config_manager.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::bidding::budget::Overhead;
use crate::error::ConfigError;
use crate::model::bidder::{BidderConfig, BidderRegistry};

/// creative cache 服务地址
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub url: String,
    /// 缓存写入自身的超时上限，实际还会被 auction deadline 截断
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,
}

/// **auction 运行配置**，所有字段都有默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionConfig {
    #[serde(default = "default_tmax_ms")]
    pub default_tmax_ms: u64,
    #[serde(default = "max_tmax_ms")]
    pub max_tmax_ms: u64,
    #[serde(default = "default_cache_reserve_ms")]
    pub cache_write_reserve_ms: u64,
    #[serde(default = "default_serialization_reserve_ms")]
    pub serialization_reserve_ms: u64,
    #[serde(default = "default_currency")]
    pub ad_server_currency: String,
    /// from -> to -> rate
    #[serde(default)]
    pub currency_rates: HashMap<String, HashMap<String, f64>>,
    /// 每个 imp 最多返回的 bid 数（1 表示只返回 winner）
    #[serde(default = "default_multi_bid")]
    pub multi_bid_max: usize,
    #[serde(default = "enabled")]
    pub require_cache_for_video: bool,
    #[serde(default = "enabled")]
    pub allow_debug: bool,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub line_items_file: Option<String>,
    #[serde(default)]
    pub bidders: Vec<BidderConfig>,
}

fn default_tmax_ms() -> u64 {
    500
}

fn max_tmax_ms() -> u64 {
    3000
}

fn default_cache_reserve_ms() -> u64 {
    30
}

fn default_serialization_reserve_ms() -> u64 {
    10
}

fn default_cache_timeout_ms() -> u64 {
    100
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_multi_bid() -> usize {
    1
}

fn enabled() -> bool {
    true
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            default_tmax_ms: default_tmax_ms(),
            max_tmax_ms: max_tmax_ms(),
            cache_write_reserve_ms: default_cache_reserve_ms(),
            serialization_reserve_ms: default_serialization_reserve_ms(),
            ad_server_currency: default_currency(),
            currency_rates: HashMap::new(),
            multi_bid_max: default_multi_bid(),
            require_cache_for_video: true,
            allow_debug: true,
            cache: None,
            line_items_file: None,
            bidders: Vec::new(),
        }
    }
}

impl AuctionConfig {
    pub fn overhead(&self) -> Overhead {
        Overhead {
            cache_write: Duration::from_millis(self.cache_write_reserve_ms),
            serialization: Duration::from_millis(self.serialization_reserve_ms),
        }
    }

    /// 请求的 tmax：缺省取默认值，超过上限则截断
    pub fn effective_tmax(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms.unwrap_or(self.default_tmax_ms).min(self.max_tmax_ms);
        Duration::from_millis(ms)
    }

    pub fn registry(&self) -> BidderRegistry {
        self.bidders.iter().cloned().collect()
    }
}

/// 从 JSON 文件加载配置
pub struct ConfigManager;

impl ConfigManager {
    pub fn load(path: &str) -> Result<AuctionConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &str, content: &str) -> Result<AuctionConfig, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = AuctionConfig::default();
        assert_eq!(cfg.default_tmax_ms, 500);
        assert_eq!(cfg.ad_server_currency, "USD");
        assert_eq!(cfg.multi_bid_max, 1);
        assert!(cfg.cache.is_none());
        assert_eq!(cfg.overhead().total(), Duration::from_millis(40));
    }

    #[test]
    fn tmax_is_defaulted_and_clamped() {
        let cfg = AuctionConfig::default();
        assert_eq!(cfg.effective_tmax(None), Duration::from_millis(500));
        assert_eq!(cfg.effective_tmax(Some(200)), Duration::from_millis(200));
        assert_eq!(cfg.effective_tmax(Some(60_000)), Duration::from_millis(3000));
    }

    #[test]
    fn parses_bidders_and_cache() {
        let cfg = ConfigManager::parse(
            "inline",
            r#"{
                "cache": {"url": "http://cache/cache"},
                "bidders": [
                    {"name": "alpha", "endpoint": "http://a/bid", "request_mode": "per_imp"},
                    {"name": "beta", "endpoint": "http://b/bid", "enabled": false}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.as_ref().map(|c| c.timeout_ms), Some(100));
        let registry = cfg.registry();
        let active: Vec<_> = registry.active_bidders().iter().map(|b| b.name.clone()).collect();
        assert_eq!(active, vec!["alpha"]);
    }

    #[test]
    fn malformed_config_reports_path() {
        let err = ConfigManager::parse("cfg.json", "{ nope").unwrap_err();
        assert!(err.to_string().contains("cfg.json"));
    }
}
