use serde::{Deserialize, Serialize};

/// OpenRTB BidRequest 的子集（发往下游 bidder）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BidRequest {
    pub id: String,
    pub imp: Vec<Imp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmax: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cur: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<i32>,
}

/// 广告展示请求
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Imp {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<Native>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloorcur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmp: Option<Pmp>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Format {
    pub w: u32,
    pub h: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Banner {
    #[serde(default)]
    pub format: Vec<Format>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Video {
    #[serde(default)]
    pub mimes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Native {
    pub request: String,
}

/// 私有交易（PMP）信息
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pmp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_auction: Option<i32>,
    #[serde(default)]
    pub deals: Vec<Deal>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Deal {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloorcur: Option<String>,
}

impl BidRequest {
    /// 该请求代表的 deal（按约定每个 deal 请求只携带一个 deal）
    pub fn first_deal_id(&self) -> Option<&str> {
        self.imp
            .iter()
            .filter_map(|imp| imp.pmp.as_ref())
            .flat_map(|pmp| pmp.deals.iter())
            .map(|d| d.id.as_str())
            .next()
    }
}
