// src/model/deals.rs

use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::ConfigError;
use crate::model::request::ImpRequest;
use crate::model::slot::{AdType, Format, Price};

/// **DealCandidate：某个 line item 对某个 imp 的保量竞争资格**
/// priority 越小优先级越高。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DealCandidate {
    pub line_item_id: String,
    pub deal_id: String,
    pub priority: u32,
    #[serde(default)]
    pub terms: DealTerms,
    /// 只由该 bidder 承接；None 表示任何参与 deal 的 bidder 都可以
    #[serde(default)]
    pub bidder: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealTerms {
    Fixed { price: Price },
    Floor { price: Price },
    #[default]
    Open,
}

impl DealCandidate {
    /// deal 自己的底价；Fixed 和 Floor 都按底价处理
    pub fn floor(&self) -> Option<&Price> {
        match &self.terms {
            DealTerms::Fixed { price } | DealTerms::Floor { price } => Some(price),
            DealTerms::Open => None,
        }
    }

    pub fn served_by(&self, bidder: &str) -> bool {
        self.bidder.as_deref().map_or(true, |b| b == bidder)
    }
}

/// 外部 line item planner 的只读查询接口
pub trait LineItemPlanner: Send + Sync {
    /// 返回当前对该 imp 生效的 deal，按 priority 升序
    fn candidates(&self, imp: &ImpRequest) -> Vec<DealCandidate>;
}

/// 不提供任何 deal 的 planner
pub struct NoDeals;

impl LineItemPlanner for NoDeals {
    fn candidates(&self, _imp: &ImpRequest) -> Vec<DealCandidate> {
        Vec::new()
    }
}

/// line item 的定向条件，空字段表示不限制
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Targeting {
    #[serde(default)]
    pub imp_ids: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<Format>,
    #[serde(default)]
    pub ad_type: Option<AdType>,
}

impl Targeting {
    fn matches(&self, imp: &ImpRequest) -> bool {
        let id_ok = self.imp_ids.is_empty() || self.imp_ids.iter().any(|id| *id == imp.id);
        let size_ok = self.sizes.is_empty() || imp.sizes.iter().any(|s| self.sizes.contains(s));
        let type_ok = self.ad_type.map_or(true, |t| t == imp.ad_type);
        id_ok && size_ok && type_ok
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LineItem {
    #[serde(flatten)]
    pub candidate: DealCandidate,
    #[serde(default)]
    pub targeting: Targeting,
}

/// 从 JSON 文件加载 line item 的静态 planner
pub struct StaticLineItemPlanner {
    line_items: Vec<LineItem>,
}

impl StaticLineItemPlanner {
    pub fn new(line_items: Vec<LineItem>) -> Self {
        Self { line_items }
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let line_items: Vec<LineItem> =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(Self::new(line_items))
    }
}

impl LineItemPlanner for StaticLineItemPlanner {
    fn candidates(&self, imp: &ImpRequest) -> Vec<DealCandidate> {
        let mut found: Vec<DealCandidate> = self
            .line_items
            .iter()
            .filter(|li| li.targeting.matches(imp))
            .map(|li| li.candidate.clone())
            .collect();
        found.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.line_item_id.cmp(&b.line_item_id))
        });
        found
    }
}
