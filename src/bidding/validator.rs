// src/bidding/validator.rs

use serde::Serialize;
use std::time::Duration;

use crate::bidding::dispatcher::{BidderRequest, BidderResponse};
use crate::error::{BidderError, Warning};
use crate::model::bid::{Bid, BidSeq, RawBid};
use crate::model::slot::{ImpSlot, Price};

/// 单个 BidderRequest 的最终状态
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RequestStatus {
    /// 至少有一个有效出价
    Bids(usize),
    Failed(BidderError),
    /// 已出现不可超越的 winner，主动放弃等待（不是超时也不是错误）
    Abandoned,
}

impl RequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Bids(_) => "success",
            RequestStatus::Failed(e) => e.code(),
            RequestStatus::Abandoned => "abandoned",
        }
    }
}

/// 校验后的 BidderResponse
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    pub index: usize,
    pub bidder: String,
    pub status: RequestStatus,
    pub bids: Vec<Bid>,
    pub warnings: Vec<Warning>,
    /// 被放弃的请求没有耗时
    pub elapsed: Option<Duration>,
}

impl ValidatedResponse {
    pub fn abandoned(index: usize, bidder: &str) -> Self {
        Self {
            index,
            bidder: bidder.to_string(),
            status: RequestStatus::Abandoned,
            bids: Vec::new(),
            warnings: Vec::new(),
            elapsed: None,
        }
    }
}

/// **Response Validator**：把原始出价规范化成 `Bid`，无效出价丢弃并记为 warning
#[derive(Debug, Clone)]
pub struct Validator {
    default_currency: String,
}

impl Validator {
    pub fn new(default_currency: &str) -> Self {
        Self {
            default_currency: default_currency.to_string(),
        }
    }

    pub fn validate(&self, raw: BidderResponse, request: &BidderRequest, slots: &[ImpSlot]) -> ValidatedResponse {
        let BidderResponse {
            index,
            bidder,
            outcome,
            elapsed,
        } = raw;
        let raw_bids = match outcome {
            Ok(bids) => bids,
            Err(err) => {
                return ValidatedResponse {
                    index,
                    bidder,
                    status: RequestStatus::Failed(err),
                    bids: Vec::new(),
                    warnings: Vec::new(),
                    elapsed: Some(elapsed),
                }
            }
        };

        let mut bids = Vec::new();
        let mut warnings = Vec::new();
        for (position, raw_bid) in raw_bids.into_iter().enumerate() {
            let seq = BidSeq { request: index, index: position };
            match self.check(raw_bid, seq, &bidder, request, slots) {
                Ok(bid) => bids.push(bid),
                Err(warning) => warnings.push(warning),
            }
        }

        // 没有任何有效出价按 no-bid 处理，不算错误
        let status = if bids.is_empty() {
            RequestStatus::Failed(BidderError::NoBid)
        } else {
            RequestStatus::Bids(bids.len())
        };
        ValidatedResponse {
            index,
            bidder,
            status,
            bids,
            warnings,
            elapsed: Some(elapsed),
        }
    }

    fn check(
        &self,
        raw: RawBid,
        seq: BidSeq,
        bidder: &str,
        request: &BidderRequest,
        slots: &[ImpSlot],
    ) -> Result<Bid, Warning> {
        let invalid = |reason: &str| Warning::InvalidBid {
            bidder: bidder.to_string(),
            bid_id: raw.id.clone(),
            reason: reason.to_string(),
        };

        // imp 必须存在于原始请求中，并且属于这个 BidderRequest
        let slot = slots
            .iter()
            .find(|s| s.id == raw.imp_id)
            .filter(|s| request.imp_ids.contains(&s.id))
            .ok_or_else(|| Warning::OrphanBid {
                bidder: bidder.to_string(),
                bid_id: raw.id.clone(),
                imp_id: raw.imp_id.clone(),
            })?;

        if !(raw.price.is_finite() && raw.price > 0.0) {
            return Err(invalid("non-positive price"));
        }
        let has_markup = raw.adm.as_deref().map_or(false, |s| !s.trim().is_empty());
        let has_nurl = raw.nurl.as_deref().map_or(false, |s| !s.trim().is_empty());
        if !has_markup && !has_nurl {
            return Err(invalid("missing creative reference"));
        }

        // 代表某个 deal 的请求只能返回该 deal 的出价
        if let Some(expected) = &request.deal {
            if raw.deal_id.as_deref() != Some(expected.deal_id.as_str()) {
                return Err(Warning::DealMismatch {
                    bidder: bidder.to_string(),
                    bid_id: raw.id.clone(),
                    expected: expected.deal_id.clone(),
                    got: raw.deal_id.clone().unwrap_or_else(|| "none".to_string()),
                });
            }
        }

        let currency = raw
            .currency
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.default_currency.clone());
        Ok(Bid {
            seq,
            id: raw.id,
            bidder: bidder.to_string(),
            imp_id: raw.imp_id,
            price: Price {
                value: raw.price,
                currency,
            },
            deal_id: raw.deal_id.filter(|d| !d.is_empty()),
            ad_type: raw.ad_type.unwrap_or(slot.ad_type),
            adm: raw.adm,
            nurl: raw.nurl,
            creative_id: raw.creative_id,
            w: raw.w,
            h: raw.h,
        })
    }
}
