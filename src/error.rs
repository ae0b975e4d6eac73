// src/error.rs

use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

/// **竞价级别的致命错误**
/// 只有这两类会让整个 auction 失败，其它错误都被吸收成 warning/metadata。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuctionError {
    #[error("invalid timeout: requested {requested:?} leaves no time after reserving {reserved:?}")]
    InvalidTimeout { requested: Duration, reserved: Duration },
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// 单个 BidderRequest 的失败分类（非致命）
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BidderError {
    #[error("bidder timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no bid")]
    NoBid,
}

impl BidderError {
    pub fn code(&self) -> &'static str {
        match self {
            BidderError::Timeout => "timeout",
            BidderError::Transport(_) => "transport_error",
            BidderError::InvalidResponse(_) => "invalid_response",
            BidderError::NoBid => "no_bid",
        }
    }
}

impl Serialize for BidderError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// 竞价过程中收集的非致命告警
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Warning {
    #[error("{bidder}: bid {bid_id} references unknown imp {imp_id}")]
    OrphanBid { bidder: String, bid_id: String, imp_id: String },
    #[error("{bidder}: bid {bid_id} rejected: {reason}")]
    InvalidBid { bidder: String, bid_id: String, reason: String },
    #[error("{bidder}: bid {bid_id} carries deal {got} but the request represented deal {expected}")]
    DealMismatch { bidder: String, bid_id: String, expected: String, got: String },
    #[error("{bidder}: bid {bid_id} dropped, cannot compare {from} with {to}")]
    CurrencyIncomparable { bidder: String, bid_id: String, from: String, to: String },
    #[error("creative cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("{bidder}: request skipped: {reason}")]
    BidderSkipped { bidder: String, reason: String },
    #[error("{bidder}: bid {bid_id} dropped, video creative has no cache reference")]
    UncachedBidDropped { bidder: String, bid_id: String },
}

impl Serialize for Warning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("failed to read body: {0}")]
    Body(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no creative cache configured")]
    Disabled,
    #[error("no time left on the auction deadline")]
    BudgetExhausted,
    #[error("cache request timed out")]
    Timeout,
    #[error("cache returned status {0}")]
    Status(u16),
    #[error("cache transport failed: {0}")]
    Transport(String),
    #[error("malformed cache response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("no rate from {from} to {to}")]
    UnknownPair { from: String, to: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
