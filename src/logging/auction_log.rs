// src/logging/auction_log.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// **一次 auction 的聚合日志**
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuctionLog {
    pub timestamp: String,
    pub log_type: String,
    pub request_id: String,
    pub bidder_calls: usize,
    /// "success" 或 "no_fill"
    pub status: String,
    pub early_exit: bool,
    pub elapsed_ms: u64,
    pub winners: Vec<WinnerLog>,
    pub bidder_log: Vec<BidderCallLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WinnerLog {
    pub imp_id: String,
    pub bidder: String,
    pub bid_id: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
}

/// 单个 BidderRequest 的调用记录
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BidderCallLog {
    pub bidder: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_item_id: Option<String>,
    /// success / no_bid / timeout / transport_error / invalid_response / abandoned
    pub status: String,
    pub bids: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl AuctionLog {
    pub fn new(request_id: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: "auction".to_string(),
            request_id: request_id.to_string(),
            bidder_calls: 0,
            status: "no_fill".to_string(),
            early_exit: false,
            elapsed_ms: 0,
            winners: Vec::new(),
            bidder_log: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_bidder_call(&mut self, call: BidderCallLog) {
        self.bidder_log.push(call);
        self.bidder_calls += 1;
    }

    pub fn add_winner(&mut self, winner: WinnerLog) {
        self.status = "success".to_string();
        self.winners.push(winner);
    }
}
