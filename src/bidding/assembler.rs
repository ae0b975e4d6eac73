// src/bidding/assembler.rs

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::bidding::cache::CacheRef;
use crate::bidding::dispatcher::{BidderRequest, DispatchExit};
use crate::bidding::resolver::{AuctionResult, ConsideredBid, DealEvaluation, SlotOutcome};
use crate::bidding::validator::{RequestStatus, ValidatedResponse};
use crate::error::{AuctionError, Warning};
use crate::model::bid::{Bid, BidSeq};
use crate::model::slot::ImpSlot;

/// 某个 imp 的胜出出价
#[derive(Serialize, Debug, Clone)]
pub struct SlotBid {
    pub imp_id: String,
    pub bid: Bid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runner_ups: Vec<RunnerUp>,
}

/// multi-bid 时随 winner 一起返回的次优出价
#[derive(Serialize, Debug, Clone)]
pub struct RunnerUp {
    #[serde(flatten)]
    pub bid: Bid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheRef>,
}

/// bidder 的非致命错误
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BidderErrorReport {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_item_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct RequestTrace {
    pub bidder: String,
    pub imp_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_item_id: Option<String>,
    #[serde(flatten)]
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

#[derive(Serialize, Debug, Clone)]
pub struct DealTrace {
    #[serde(flatten)]
    pub evaluation: DealEvaluation,
    /// 代表该 deal 的请求各自的结果
    pub requests: Vec<RequestStatus>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SlotTrace {
    pub imp_id: String,
    pub outcome: SlotOutcome,
    pub considered: Vec<ConsideredBid>,
    pub deals: Vec<DealTrace>,
}

/// debug 模式下附带的完整诊断信息
#[derive(Serialize, Debug, Clone)]
pub struct DebugTrace {
    pub tmax_ms: u64,
    pub early_exit: bool,
    pub slots: Vec<SlotTrace>,
    pub requests: Vec<RequestTrace>,
    pub warnings: Vec<Warning>,
}

/// **最终返回给调用方的 auction 结果**
#[derive(Serialize, Debug, Clone)]
pub struct AuctionResponse {
    pub id: String,
    pub cur: String,
    pub bids: Vec<SlotBid>,
    /// bidder -> 最慢一个请求的耗时（毫秒）
    pub response_times_ms: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, Vec<BidderErrorReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugTrace>,
}

impl AuctionResponse {
    pub fn winner_for(&self, imp_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.imp_id == imp_id).map(|b| &b.bid)
    }
}

pub struct AssembleInput<'a> {
    pub auction_id: &'a str,
    pub currency: &'a str,
    pub tmax_ms: u64,
    pub slots: &'a [ImpSlot],
    pub requests: &'a [BidderRequest],
    pub responses: &'a [ValidatedResponse],
    pub results: Vec<AuctionResult>,
    pub cache_refs: &'a HashMap<BidSeq, CacheRef>,
    pub warnings: &'a [Warning],
    pub exit: DispatchExit,
    pub debug: bool,
}

/// **Response Assembler**：纯转换，只在内部不变量被破坏时失败
pub fn assemble(input: AssembleInput<'_>) -> Result<AuctionResponse, AuctionError> {
    check_invariants(&input)?;

    let mut response_times_ms: BTreeMap<String, u64> = BTreeMap::new();
    let mut errors: BTreeMap<String, Vec<BidderErrorReport>> = BTreeMap::new();
    for (response, request) in input.responses.iter().zip(input.requests) {
        if let Some(elapsed) = response.elapsed {
            let ms = elapsed.as_millis() as u64;
            let slot = response_times_ms.entry(response.bidder.clone()).or_insert(0);
            *slot = (*slot).max(ms);
        }
        if let RequestStatus::Failed(err) = &response.status {
            errors.entry(response.bidder.clone()).or_default().push(BidderErrorReport {
                code: err.code(),
                message: err.to_string(),
                line_item_id: request.deal.as_ref().map(|d| d.line_item_id.clone()),
            });
        }
    }

    let debug = if input.debug {
        Some(build_trace(&input))
    } else {
        None
    };

    let refs = input.cache_refs;
    let bids = input
        .results
        .into_iter()
        .filter_map(|result| {
            result.winner.map(|bid| SlotBid {
                imp_id: result.imp_id,
                cache: refs.get(&bid.seq).cloned(),
                bid,
                runner_ups: result
                    .runner_ups
                    .into_iter()
                    .map(|bid| RunnerUp {
                        cache: refs.get(&bid.seq).cloned(),
                        bid,
                    })
                    .collect(),
            })
        })
        .collect();

    Ok(AuctionResponse {
        id: input.auction_id.to_string(),
        cur: input.currency.to_string(),
        bids,
        response_times_ms,
        errors,
        debug,
    })
}

fn check_invariants(input: &AssembleInput<'_>) -> Result<(), AuctionError> {
    if input.requests.len() != input.responses.len() {
        return Err(AuctionError::Invariant(format!(
            "{} requests but {} responses",
            input.requests.len(),
            input.responses.len()
        )));
    }
    let known: HashSet<&str> = input.slots.iter().map(|s| s.id.as_str()).collect();
    let mut seen = HashSet::new();
    for result in &input.results {
        if !known.contains(result.imp_id.as_str()) {
            return Err(AuctionError::Invariant(format!("result for unknown imp {}", result.imp_id)));
        }
        if !seen.insert(result.imp_id.as_str()) {
            return Err(AuctionError::Invariant(format!("more than one result for imp {}", result.imp_id)));
        }
        if let Some(winner) = &result.winner {
            if winner.imp_id != result.imp_id {
                return Err(AuctionError::Invariant(format!(
                    "winner {} for imp {} placed on imp {}",
                    winner.id, winner.imp_id, result.imp_id
                )));
            }
        }
    }
    Ok(())
}

fn build_trace(input: &AssembleInput<'_>) -> DebugTrace {
    let requests = input
        .requests
        .iter()
        .zip(input.responses)
        .map(|(request, response)| RequestTrace {
            bidder: request.bidder.clone(),
            imp_ids: request.imp_ids.clone(),
            line_item_id: request.deal.as_ref().map(|d| d.line_item_id.clone()),
            status: response.status.clone(),
            elapsed_ms: response.elapsed.map(|e| e.as_millis() as u64),
        })
        .collect();

    let slots = input
        .results
        .iter()
        .map(|result| SlotTrace {
            imp_id: result.imp_id.clone(),
            outcome: result.outcome.clone(),
            considered: result.considered.clone(),
            deals: result
                .deals
                .iter()
                .map(|evaluation| DealTrace {
                    evaluation: evaluation.clone(),
                    requests: input
                        .requests
                        .iter()
                        .zip(input.responses)
                        .filter(|(req, _)| {
                            req.imp_ids.contains(&result.imp_id)
                                && req.deal.as_ref().map_or(false, |d| d.deal_id == evaluation.deal_id)
                        })
                        .map(|(_, resp)| resp.status.clone())
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let mut warnings: Vec<Warning> = input
        .responses
        .iter()
        .flat_map(|r| r.warnings.iter().cloned())
        .collect();
    warnings.extend(input.warnings.iter().cloned());

    DebugTrace {
        tmax_ms: input.tmax_ms,
        early_exit: input.exit == DispatchExit::Dominant,
        slots,
        requests,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding::transport::OutboundCall;
    use crate::error::BidderError;
    use crate::model::deals::{DealCandidate, DealTerms};
    use crate::model::slot::{AdType, Format, Price};
    use crate::bidding::resolver::DealVerdict;
    use std::time::Duration;

    fn slot(id: &str) -> ImpSlot {
        ImpSlot {
            id: id.into(),
            ad_type: AdType::Banner,
            sizes: vec![Format { w: 300, h: 250 }],
            floor: None,
            deals: vec![],
        }
    }

    fn deal() -> DealCandidate {
        DealCandidate {
            line_item_id: "li-1".into(),
            deal_id: "d1".into(),
            priority: 1,
            terms: DealTerms::Open,
            bidder: None,
        }
    }

    fn request(bidder: &str, deal: Option<DealCandidate>) -> BidderRequest {
        BidderRequest {
            bidder: bidder.into(),
            imp_ids: vec!["1".into()],
            deal,
            call: OutboundCall { url: "mem://x".into(), headers: vec![], body: vec![] },
        }
    }

    fn response(index: usize, bidder: &str, status: RequestStatus, ms: Option<u64>) -> ValidatedResponse {
        ValidatedResponse {
            index,
            bidder: bidder.into(),
            status,
            bids: vec![],
            warnings: vec![],
            elapsed: ms.map(Duration::from_millis),
        }
    }

    fn winner() -> Bid {
        Bid {
            seq: BidSeq { request: 0, index: 0 },
            id: "b1".into(),
            bidder: "alpha".into(),
            imp_id: "1".into(),
            price: Price::new(2.0, "USD"),
            deal_id: Some("d1".into()),
            ad_type: AdType::Banner,
            adm: Some("<div/>".into()),
            nurl: None,
            creative_id: None,
            w: None,
            h: None,
        }
    }

    fn result(imp: &str, winner: Option<Bid>) -> AuctionResult {
        AuctionResult {
            imp_id: imp.into(),
            outcome: SlotOutcome::DealWin { rank: 1, price: 2.0 },
            winner,
            runner_ups: vec![],
            considered: vec![],
            deals: vec![DealEvaluation {
                line_item_id: "li-1".into(),
                deal_id: "d1".into(),
                priority: 1,
                verdict: DealVerdict::Won,
            }],
        }
    }

    #[test]
    fn assembles_winners_times_and_errors() {
        let slots = vec![slot("1")];
        let requests = vec![request("alpha", Some(deal())), request("alpha", None), request("beta", None)];
        let responses = vec![
            response(0, "alpha", RequestStatus::Bids(1), Some(30)),
            response(1, "alpha", RequestStatus::Failed(BidderError::NoBid), Some(45)),
            response(2, "beta", RequestStatus::Failed(BidderError::Timeout), Some(160)),
        ];
        let mut refs = HashMap::new();
        refs.insert(BidSeq { request: 0, index: 0 }, CacheRef { uuid: "u".into(), url: "http://c?uuid=u".into() });
        let out = assemble(AssembleInput {
            auction_id: "a1",
            currency: "USD",
            tmax_ms: 200,
            slots: &slots,
            requests: &requests,
            responses: &responses,
            results: vec![result("1", Some(winner()))],
            cache_refs: &refs,
            warnings: &[],
            exit: DispatchExit::Complete,
            debug: true,
        })
        .unwrap();

        assert_eq!(out.winner_for("1").map(|b| b.id.as_str()), Some("b1"));
        assert_eq!(out.bids[0].cache.as_ref().map(|c| c.uuid.as_str()), Some("u"));
        assert_eq!(out.response_times_ms["alpha"], 45);
        assert_eq!(out.response_times_ms["beta"], 160);
        assert_eq!(out.errors["beta"][0].code, "timeout");
        let trace = out.debug.unwrap();
        assert_eq!(trace.requests.len(), 3);
        assert_eq!(trace.slots[0].deals[0].requests, vec![RequestStatus::Bids(1)]);
    }

    #[test]
    fn slots_without_winner_are_left_out_and_debug_is_optional() {
        let slots = vec![slot("1")];
        let out = assemble(AssembleInput {
            auction_id: "a1",
            currency: "USD",
            tmax_ms: 200,
            slots: &slots,
            requests: &[],
            responses: &[],
            results: vec![result("1", None)],
            cache_refs: &HashMap::new(),
            warnings: &[],
            exit: DispatchExit::Complete,
            debug: false,
        })
        .unwrap();
        assert!(out.bids.is_empty());
        assert!(out.debug.is_none());
    }

    #[test]
    fn duplicate_results_violate_invariants() {
        let slots = vec![slot("1")];
        let err = assemble(AssembleInput {
            auction_id: "a1",
            currency: "USD",
            tmax_ms: 200,
            slots: &slots,
            requests: &[],
            responses: &[],
            results: vec![result("1", None), result("1", None)],
            cache_refs: &HashMap::new(),
            warnings: &[],
            exit: DispatchExit::Complete,
            debug: false,
        })
        .unwrap_err();
        assert!(matches!(err, AuctionError::Invariant(_)));
    }
}
