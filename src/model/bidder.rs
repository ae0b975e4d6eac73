// src/model/bidder.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// bidder 如何把多个 imp 拆分成 BidderRequest
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// 所有 imp 合并成一个请求
    #[default]
    Batched,
    /// 每个 imp 一个请求
    PerImp,
}

/// **下游 bidder 的基础配置**
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidderConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub request_mode: RequestMode,
    /// 是否参与公开竞价
    #[serde(default = "enabled_by_default")]
    pub open_market: bool,
    /// 是否承接 deal（每个 DealCandidate 单独一个请求）
    #[serde(default = "enabled_by_default")]
    pub deals: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl BidderConfig {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            enabled: true,
            request_mode: RequestMode::Batched,
            open_market: true,
            deals: true,
        }
    }
}

/// **bidder 管理器**
/// 使用 BTreeMap 保证遍历顺序稳定，从而 BidderRequest 的下标是确定的。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BidderRegistry {
    pub bidders: BTreeMap<String, BidderConfig>,
}

impl BidderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bidder(&mut self, bidder: BidderConfig) {
        self.bidders.insert(bidder.name.clone(), bidder);
    }

    pub fn remove_bidder(&mut self, name: &str) {
        self.bidders.remove(name);
    }

    pub fn get_bidder(&self, name: &str) -> Option<&BidderConfig> {
        self.bidders.get(name)
    }

    /// 所有 enabled 的 bidder，按名字排序
    pub fn active_bidders(&self) -> Vec<&BidderConfig> {
        self.bidders.values().filter(|b| b.enabled).collect()
    }
}

impl FromIterator<BidderConfig> for BidderRegistry {
    fn from_iter<I: IntoIterator<Item = BidderConfig>>(iter: I) -> Self {
        let mut registry = BidderRegistry::new();
        for bidder in iter {
            registry.add_bidder(bidder);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 随机生成 bidder：名字由字母组成并以 _hb 结尾
    fn generate_bidder() -> impl Strategy<Value = BidderConfig> {
        (
            "[a-zA-Z]{5,15}".prop_map(|s| format!("{}_hb", s)),
            any::<bool>(),
            prop_oneof![Just(RequestMode::Batched), Just(RequestMode::PerImp)],
        )
            .prop_map(|(name, enabled, request_mode)| BidderConfig {
                endpoint: format!("http://localhost:9001/bid/{}", name),
                name,
                enabled,
                request_mode,
                open_market: true,
                deals: true,
            })
    }

    proptest! {
        #[test]
        fn active_bidders_are_enabled_and_sorted(bidders in prop::collection::vec(generate_bidder(), 1..10)) {
            let registry: BidderRegistry = bidders.into_iter().collect();
            let active = registry.active_bidders();
            prop_assert!(active.iter().all(|b| b.enabled));
            let names: Vec<_> = active.iter().map(|b| b.name.clone()).collect();
            let mut sorted = names.clone();
            sorted.sort();
            prop_assert_eq!(names, sorted);
        }
    }

    #[test]
    fn config_defaults_enable_everything() {
        let b: BidderConfig =
            serde_json::from_str(r#"{"name":"alpha","endpoint":"http://a/bid"}"#).unwrap();
        assert!(b.enabled && b.open_market && b.deals);
        assert_eq!(b.request_mode, RequestMode::Batched);
    }

    #[test]
    fn remove_bidder_drops_it() {
        let mut registry = BidderRegistry::new();
        registry.add_bidder(BidderConfig::new("alpha", "http://a"));
        registry.remove_bidder("alpha");
        assert!(registry.get_bidder("alpha").is_none());
    }
}
