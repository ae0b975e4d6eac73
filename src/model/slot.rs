// src/model/slot.rs

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::model::deals::DealCandidate;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum AdType {
    Native = 1,
    Banner = 2,
    Video = 3,
}

impl TryFrom<u8> for AdType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AdType::Native),
            2 => Ok(AdType::Banner),
            3 => Ok(AdType::Video),
            _ => Err(format!("Invalid value for AdType: {}", value)),
        }
    }
}

impl From<AdType> for u8 {
    fn from(ad: AdType) -> Self {
        ad as u8
    }
}

impl Default for AdType {
    fn default() -> Self {
        AdType::Banner
    }
}

/// 广告位尺寸
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub w: u32,
    pub h: u32,
}

/// 金额 + 币种
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Price {
    pub value: f64,
    pub currency: String,
}

impl Price {
    pub fn new(value: f64, currency: &str) -> Self {
        Self {
            value,
            currency: currency.to_string(),
        }
    }
}

/// **ImpSlot：一次竞价中的一个广告展示机会**
/// deals 由 line item planner 提供，按请求时刻只读。
#[derive(Serialize, Debug, Clone)]
pub struct ImpSlot {
    pub id: String,
    pub ad_type: AdType,
    pub sizes: Vec<Format>,
    pub floor: Option<Price>,
    pub deals: Vec<DealCandidate>,
}

impl ImpSlot {
    pub fn deal(&self, deal_id: &str) -> Option<&DealCandidate> {
        self.deals.iter().find(|d| d.deal_id == deal_id)
    }

    pub fn has_deals(&self) -> bool {
        !self.deals.is_empty()
    }
}
