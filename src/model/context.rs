// src/model/context.rs

use std::collections::HashSet;
use tracing::warn;

use crate::bidding::budget::Deadline;
use crate::bidding::dispatcher::{BidderRequest, DispatchExit, DispatchOutcome};
use crate::bidding::resolver::AuctionResult;
use crate::bidding::validator::ValidatedResponse;
use crate::error::Warning;
use crate::model::bid::Bid;
use crate::model::deals::LineItemPlanner;
use crate::model::request::AuctionRequest;
use crate::model::slot::{ImpSlot, Price};

/// **AuctionContext：一次 auction 的全部状态**
/// 只属于当前 `run_auction` 调用，响应写出后即丢弃。
#[derive(Debug)]
pub struct AuctionContext {
    pub request: AuctionRequest,
    pub deadline: Deadline,
    pub slots: Vec<ImpSlot>,
    /// 出站请求，下标即 BidSeq.request
    pub requests: Vec<BidderRequest>,
    /// 与 `requests` 一一对应（dispatch 之后才有）
    pub responses: Vec<ValidatedResponse>,
    /// 编排过程中的告警（不含各 response 自带的告警）
    pub warnings: Vec<Warning>,
    pub results: Vec<AuctionResult>,
    pub exit: DispatchExit,
}

impl AuctionContext {
    pub fn new(request: AuctionRequest, deadline: Deadline, slots: Vec<ImpSlot>) -> Self {
        Self {
            request,
            deadline,
            slots,
            requests: Vec::new(),
            responses: Vec::new(),
            warnings: Vec::new(),
            results: Vec::new(),
            exit: DispatchExit::Complete,
        }
    }

    pub fn record_dispatch(&mut self, outcome: DispatchOutcome) {
        self.responses = outcome.responses;
        self.exit = outcome.exit;
    }

    /// 所有校验通过的出价，按 BidSeq 排序
    pub fn bids(&self) -> Vec<Bid> {
        let mut bids: Vec<Bid> = self
            .responses
            .iter()
            .flat_map(|r| r.bids.iter().cloned())
            .collect();
        bids.sort_by_key(|b| b.seq);
        bids
    }

    pub fn early_exit(&self) -> bool {
        self.exit == DispatchExit::Dominant
    }

    /// 会出现在响应里的出价：每个 imp 的 winner 加上 runner-ups
    pub fn returned_bids(&self) -> Vec<&Bid> {
        self.results
            .iter()
            .flat_map(|r| r.winner.iter().chain(r.runner_ups.iter()))
            .collect()
    }
}

/// 把入站 imp 转换成 ImpSlot，并挂上 planner 给出的 DealCandidate
///
/// 重复的 imp id 只保留第一个；bidfloor <= 0 视为没有底价。
pub fn build_slots(request: &AuctionRequest, planner: &dyn LineItemPlanner, default_currency: &str) -> Vec<ImpSlot> {
    let mut seen = HashSet::new();
    let mut slots = Vec::with_capacity(request.imp.len());
    for imp in &request.imp {
        if !seen.insert(imp.id.as_str()) {
            warn!(auction_id = %request.id, imp_id = %imp.id, "duplicate imp id ignored");
            continue;
        }
        let floor = imp.bidfloor.filter(|f| *f > 0.0).map(|value| {
            Price::new(value, imp.bidfloorcur.as_deref().unwrap_or(default_currency))
        });
        slots.push(ImpSlot {
            id: imp.id.clone(),
            ad_type: imp.ad_type,
            sizes: imp.sizes.clone(),
            floor,
            deals: planner.candidates(imp),
        });
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::deals::{DealCandidate, DealTerms, LineItem, NoDeals, StaticLineItemPlanner, Targeting};
    use crate::model::request::ImpRequest;
    use crate::model::slot::{AdType, Format};

    fn imp(id: &str, floor: Option<f64>) -> ImpRequest {
        ImpRequest {
            id: id.into(),
            ad_type: AdType::Banner,
            sizes: vec![Format { w: 300, h: 250 }],
            bidfloor: floor,
            bidfloorcur: None,
        }
    }

    fn request(imps: Vec<ImpRequest>) -> AuctionRequest {
        AuctionRequest {
            id: "a1".into(),
            imp: imps,
            tmax: None,
            debug: false,
            bidders: None,
            blocked_bidders: vec![],
        }
    }

    #[test]
    fn duplicate_imps_are_collapsed_and_zero_floor_dropped() {
        let req = request(vec![imp("1", Some(0.0)), imp("1", Some(3.0)), imp("2", Some(1.5))]);
        let slots = build_slots(&req, &NoDeals, "EUR");
        assert_eq!(slots.len(), 2);
        assert!(slots[0].floor.is_none());
        assert_eq!(slots[1].floor, Some(Price::new(1.5, "EUR")));
    }

    #[test]
    fn planner_candidates_are_attached_per_imp() {
        let planner = StaticLineItemPlanner::new(vec![LineItem {
            candidate: DealCandidate {
                line_item_id: "li-1".into(),
                deal_id: "d1".into(),
                priority: 1,
                terms: DealTerms::Open,
                bidder: None,
            },
            targeting: Targeting { imp_ids: vec!["2".into()], ..Targeting::default() },
        }]);
        let slots = build_slots(&request(vec![imp("1", None), imp("2", None)]), &planner, "USD");
        assert!(!slots[0].has_deals());
        assert_eq!(slots[1].deal("d1").map(|d| d.priority), Some(1));
    }
}
