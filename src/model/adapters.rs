// src/model/adapters.rs

use std::time::Duration;

use crate::bidding::transport::{OutboundCall, RawReply};
use crate::error::AdapterError;
use crate::model::bid::RawBid;
use crate::model::bidder::{BidderConfig, RequestMode};
use crate::model::deals::DealCandidate;
use crate::model::slot::{AdType, ImpSlot};
use crate::openrtb::request::{Banner, BidRequest, Deal, Format, Imp, Native, Pmp, Video};
use crate::openrtb::response::BidResponse;

/// 一个 BidderRequest 的拆分方案：覆盖哪些 imp，代表哪个 deal
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan {
    pub imp_ids: Vec<String>,
    pub deal: Option<DealCandidate>,
}

/// **bidder adapter：只做格式转换的无状态插件**
///
/// 如何把 imp 拆分成请求（合并 / 按 imp / 按 deal）由 adapter 决定，orchestrator 不关心。
pub trait BidderAdapter: Send + Sync {
    fn bidder(&self) -> &str;

    fn partition(&self, slots: &[ImpSlot]) -> Vec<RequestPlan>;

    fn build_request(
        &self,
        auction_id: &str,
        tmax: Duration,
        slots: &[&ImpSlot],
        deal: Option<&DealCandidate>,
    ) -> Result<OutboundCall, AdapterError>;

    fn parse_response(&self, reply: &RawReply) -> Result<Vec<RawBid>, AdapterError>;
}

/// 按 bidder 配置拆分请求：公开竞价按 request_mode，deal 每个 (imp, deal) 一个请求
pub fn partition_by_config(config: &BidderConfig, slots: &[ImpSlot]) -> Vec<RequestPlan> {
    let mut plans = Vec::new();
    if config.open_market && !slots.is_empty() {
        match config.request_mode {
            RequestMode::Batched => plans.push(RequestPlan {
                imp_ids: slots.iter().map(|s| s.id.clone()).collect(),
                deal: None,
            }),
            RequestMode::PerImp => plans.extend(slots.iter().map(|s| RequestPlan {
                imp_ids: vec![s.id.clone()],
                deal: None,
            })),
        }
    }
    if config.deals {
        for slot in slots {
            for deal in slot.deals.iter().filter(|d| d.served_by(&config.name)) {
                plans.push(RequestPlan {
                    imp_ids: vec![slot.id.clone()],
                    deal: Some(deal.clone()),
                });
            }
        }
    }
    plans
}

/// 通用 OpenRTB 2.x adapter
pub struct OpenRtbAdapter {
    config: BidderConfig,
    currency: String,
}

impl OpenRtbAdapter {
    pub fn new(config: BidderConfig, currency: &str) -> Self {
        Self {
            config,
            currency: currency.to_string(),
        }
    }

    fn to_imp(slot: &ImpSlot, deal: Option<&DealCandidate>) -> Imp {
        let formats: Vec<Format> = slot.sizes.iter().map(|s| Format { w: s.w, h: s.h }).collect();
        let (banner, video, native) = match slot.ad_type {
            AdType::Banner => (Some(Banner { format: formats }), None, None),
            AdType::Video => {
                let first = formats.first();
                let video = Video {
                    mimes: vec!["video/mp4".to_string()],
                    w: first.map(|f| f.w),
                    h: first.map(|f| f.h),
                };
                (None, Some(video), None)
            }
            AdType::Native => (None, None, Some(Native { request: "{}".to_string() })),
        };
        // deal 请求的底价优先用 deal 条款
        let floor = deal.and_then(|d| d.floor()).or(slot.floor.as_ref());
        let pmp = deal.map(|d| Pmp {
            private_auction: Some(1),
            deals: vec![Deal {
                id: d.deal_id.clone(),
                bidfloor: d.floor().map(|p| p.value),
                bidfloorcur: d.floor().map(|p| p.currency.clone()),
            }],
        });
        Imp {
            id: slot.id.clone(),
            banner,
            video,
            native,
            bidfloor: floor.map(|p| p.value),
            bidfloorcur: floor.map(|p| p.currency.clone()),
            pmp,
        }
    }
}

fn ad_type_from_mtype(mtype: Option<u8>) -> Option<AdType> {
    match mtype {
        Some(1) => Some(AdType::Banner),
        Some(2) => Some(AdType::Video),
        Some(4) => Some(AdType::Native),
        _ => None,
    }
}

impl BidderAdapter for OpenRtbAdapter {
    fn bidder(&self) -> &str {
        &self.config.name
    }

    fn partition(&self, slots: &[ImpSlot]) -> Vec<RequestPlan> {
        partition_by_config(&self.config, slots)
    }

    fn build_request(
        &self,
        auction_id: &str,
        tmax: Duration,
        slots: &[&ImpSlot],
        deal: Option<&DealCandidate>,
    ) -> Result<OutboundCall, AdapterError> {
        let request = BidRequest {
            id: auction_id.to_string(),
            imp: slots.iter().map(|s| Self::to_imp(s, deal)).collect(),
            tmax: Some(tmax.as_millis() as u64),
            cur: vec![self.currency.clone()],
            test: None,
        };
        let body = serde_json::to_vec(&request).map_err(|e| AdapterError::Encode(e.to_string()))?;
        Ok(OutboundCall {
            url: self.config.endpoint.clone(),
            headers: vec![("x-openrtb-version".to_string(), "2.6".to_string())],
            body,
        })
    }

    fn parse_response(&self, reply: &RawReply) -> Result<Vec<RawBid>, AdapterError> {
        let mut buf = reply.body.clone();
        let response: BidResponse =
            simd_json::serde::from_slice(&mut buf).map_err(|e| AdapterError::Decode(e.to_string()))?;
        let currency = response.cur.clone();
        Ok(response
            .seatbid
            .into_iter()
            .flat_map(|seat| seat.bid.into_iter())
            .map(|bid| RawBid {
                id: bid.id,
                imp_id: bid.impid,
                price: bid.price,
                currency: currency.clone(),
                deal_id: bid.dealid,
                adm: bid.adm,
                nurl: bid.nurl,
                creative_id: bid.crid,
                ad_type: ad_type_from_mtype(bid.mtype),
                w: bid.w,
                h: bid.h,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::deals::DealTerms;
    use crate::model::slot::{Format as SlotFormat, Price};

    fn slot(id: &str, deals: Vec<DealCandidate>) -> ImpSlot {
        ImpSlot {
            id: id.to_string(),
            ad_type: AdType::Banner,
            sizes: vec![SlotFormat { w: 300, h: 250 }],
            floor: Some(Price::new(0.5, "USD")),
            deals,
        }
    }

    fn deal(line_item: &str, priority: u32, bidder: Option<&str>) -> DealCandidate {
        DealCandidate {
            line_item_id: line_item.to_string(),
            deal_id: format!("deal-{}", line_item),
            priority,
            terms: DealTerms::Floor { price: Price::new(2.0, "USD") },
            bidder: bidder.map(str::to_string),
        }
    }

    #[test]
    fn batched_bidder_gets_one_open_request_plus_one_per_deal() {
        let config = BidderConfig::new("alpha", "http://a/bid");
        let slots = vec![
            slot("1", vec![deal("li1", 1, None), deal("li2", 2, Some("beta"))]),
            slot("2", vec![]),
        ];
        let plans = partition_by_config(&config, &slots);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].imp_ids, vec!["1", "2"]);
        assert!(plans[0].deal.is_none());
        assert_eq!(plans[1].deal.as_ref().map(|d| d.line_item_id.as_str()), Some("li1"));
    }

    #[test]
    fn per_imp_deal_only_bidder() {
        let mut config = BidderConfig::new("beta", "http://b/bid");
        config.request_mode = RequestMode::PerImp;
        config.open_market = false;
        let slots = vec![slot("1", vec![deal("li1", 1, None), deal("li2", 2, Some("beta"))])];
        let plans = partition_by_config(&config, &slots);
        let ids: Vec<_> = plans.iter().filter_map(|p| p.deal.as_ref()).map(|d| d.line_item_id.clone()).collect();
        assert_eq!(ids, vec!["li1", "li2"]);
    }

    #[test]
    fn deal_request_carries_pmp_and_deal_floor() {
        let adapter = OpenRtbAdapter::new(BidderConfig::new("alpha", "http://a/bid"), "USD");
        let s = slot("1", vec![]);
        let d = deal("li1", 1, None);
        let call = adapter
            .build_request("auction-1", Duration::from_millis(150), &[&s], Some(&d))
            .unwrap();
        assert_eq!(call.url, "http://a/bid");
        let sent: BidRequest = serde_json::from_slice(&call.body).unwrap();
        assert_eq!(sent.tmax, Some(150));
        assert_eq!(sent.imp[0].bidfloor, Some(2.0));
        assert_eq!(sent.first_deal_id(), Some("deal-li1"));
    }

    #[test]
    fn parses_seatbids_with_response_currency() {
        let adapter = OpenRtbAdapter::new(BidderConfig::new("alpha", "http://a/bid"), "USD");
        let body = br#"{"id":"auction-1","cur":"EUR","seatbid":[{"bid":[
            {"id":"b1","impid":"1","price":1.5,"adm":"<div/>","dealid":"deal-li1","mtype":1}
        ]}]}"#;
        let bids = adapter
            .parse_response(&RawReply { status: 200, body: body.to_vec() })
            .unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].currency.as_deref(), Some("EUR"));
        assert_eq!(bids[0].deal_id.as_deref(), Some("deal-li1"));
        assert_eq!(bids[0].ad_type, Some(AdType::Banner));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let adapter = OpenRtbAdapter::new(BidderConfig::new("alpha", "http://a/bid"), "USD");
        let err = adapter
            .parse_response(&RawReply { status: 200, body: b"<html>oops".to_vec() })
            .unwrap_err();
        assert!(matches!(err, AdapterError::Decode(_)));
    }
}
