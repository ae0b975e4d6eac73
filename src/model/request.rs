// src/model/request.rs

use serde::{Deserialize, Serialize};

use crate::model::slot::{AdType, Format};

/// **入站竞价请求**
/// 由外层 HTTP 层解析好后交给 `AuctionEngine::run_auction`。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuctionRequest {
    pub id: String,
    pub imp: Vec<ImpRequest>,
    /// 请求方允许的最长耗时（毫秒），缺省时使用配置中的 default_tmax_ms
    #[serde(default)]
    pub tmax: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    /// 仅允许这些 bidder 参与（None 表示不限制）
    #[serde(default)]
    pub bidders: Option<Vec<String>>,
    /// 预先计算好的隐私/consent 决策：这些 bidder 不允许参与
    #[serde(default)]
    pub blocked_bidders: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImpRequest {
    pub id: String,
    #[serde(default)]
    pub ad_type: AdType,
    #[serde(default)]
    pub sizes: Vec<Format>,
    #[serde(default)]
    pub bidfloor: Option<f64>,
    #[serde(default)]
    pub bidfloorcur: Option<String>,
}

impl AuctionRequest {
    /// bidder 是否被请求本身允许参与
    pub fn allows_bidder(&self, bidder: &str) -> bool {
        if self.blocked_bidders.iter().any(|b| b == bidder) {
            return false;
        }
        match &self.bidders {
            Some(allowed) => allowed.iter().any(|b| b == bidder),
            None => true,
        }
    }
}
