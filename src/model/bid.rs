// src/model/bid.rs

use serde::{Deserialize, Serialize};

use crate::model::slot::{AdType, Price};

/// adapter 解析出来、尚未校验的出价
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RawBid {
    pub id: String,
    pub imp_id: String,
    pub price: f64,
    pub currency: Option<String>,
    pub deal_id: Option<String>,
    pub adm: Option<String>,
    pub nurl: Option<String>,
    pub creative_id: Option<String>,
    pub ad_type: Option<AdType>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

/// 出价在本次 auction 中的确定性序号：(BidderRequest 下标, 响应内下标)
/// 与网络到达的物理顺序无关，只用作最后的 tie-break。
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BidSeq {
    pub request: usize,
    pub index: usize,
}

/// **校验后的出价，生成后不可变**
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Bid {
    pub seq: BidSeq,
    pub id: String,
    pub bidder: String,
    pub imp_id: String,
    pub price: Price,
    pub deal_id: Option<String>,
    pub ad_type: AdType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
}

impl Bid {
    /// 可以写入 creative cache 的内容
    pub fn cacheable_markup(&self) -> Option<&str> {
        self.adm.as_deref().filter(|adm| !adm.trim().is_empty())
    }
}
