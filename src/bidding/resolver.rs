// src/bidding/resolver.rs

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Warning;
use crate::model::bid::{Bid, BidSeq};
use crate::model::currency::CurrencyConverter;
use crate::model::slot::{ImpSlot, Price};

/// **一个出价在所属 imp 上的排名键**
///
/// `Ord` 的顺序即胜出顺序：Less 表示更好。
/// deal 永远排在公开竞价之前；deal 之间按 (priority 升序, 价格降序, seq 升序)，
/// 公开竞价按 (价格降序, seq 升序)。
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Standing {
    Deal { rank: u32, price: f64, seq: BidSeq },
    OpenMarket { price: f64, seq: BidSeq },
}

impl Eq for Standing {}

impl Ord for Standing {
    fn cmp(&self, other: &Self) -> Ordering {
        use Standing::*;
        match (self, other) {
            (Deal { .. }, OpenMarket { .. }) => Ordering::Less,
            (OpenMarket { .. }, Deal { .. }) => Ordering::Greater,
            (
                Deal { rank: ra, price: pa, seq: sa },
                Deal { rank: rb, price: pb, seq: sb },
            ) => ra
                .cmp(rb)
                .then_with(|| pb.total_cmp(pa))
                .then_with(|| sa.cmp(sb)),
            (OpenMarket { price: pa, seq: sa }, OpenMarket { price: pb, seq: sb }) => {
                pb.total_cmp(pa).then_with(|| sa.cmp(sb))
            }
        }
    }
}

impl PartialOrd for Standing {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Standing {
    pub fn is_deal(&self) -> bool {
        matches!(self, Standing::Deal { .. })
    }
}

/// 每个 imp 的最终结果
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SlotOutcome {
    DealWin { rank: u32, price: f64 },
    OpenMarketWin { price: f64 },
    NoWin,
}

impl From<Option<&Standing>> for SlotOutcome {
    fn from(best: Option<&Standing>) -> Self {
        match best {
            Some(Standing::Deal { rank, price, .. }) => SlotOutcome::DealWin { rank: *rank, price: *price },
            Some(Standing::OpenMarket { price, .. }) => SlotOutcome::OpenMarketWin { price: *price },
            None => SlotOutcome::NoWin,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Won,
    RunnerUp,
    Outranked,
    BelowFloor,
    CurrencyIncomparable,
    /// cache 失败，视频出价没有缓存引用被丢弃
    Uncached,
}

/// debug trace 中的一条被考虑过的出价
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConsideredBid {
    pub bid_id: String,
    pub bidder: String,
    pub deal_id: Option<String>,
    pub price: Price,
    pub verdict: Verdict,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DealVerdict {
    Won,
    /// 被更高优先级（或同级更高价）的出价击败
    Outranked { by: String },
    BelowFloor,
    NoValidBid,
    /// 胜出但因缺少缓存引用被丢弃
    Uncached,
}

/// 单个 DealCandidate 的评估结果
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DealEvaluation {
    pub line_item_id: String,
    pub deal_id: String,
    pub priority: u32,
    #[serde(flatten)]
    pub verdict: DealVerdict,
}

/// **AuctionResult**：每个 imp 至多一个 winner
#[derive(Debug, Clone)]
pub struct AuctionResult {
    pub imp_id: String,
    pub outcome: SlotOutcome,
    pub winner: Option<Bid>,
    pub runner_ups: Vec<Bid>,
    pub considered: Vec<ConsideredBid>,
    pub deals: Vec<DealEvaluation>,
}

/// 单个 imp 排序后的中间结果
struct Ranking<'b> {
    viable: Vec<(Standing, &'b Bid)>,
    rejected: Vec<(&'b Bid, Verdict)>,
    warnings: Vec<Warning>,
}

/// **Winner Resolver**
#[derive(Clone)]
pub struct Resolver {
    rates: Arc<dyn CurrencyConverter>,
    currency: String,
    multi_bid_max: usize,
}

impl Resolver {
    pub fn new(rates: Arc<dyn CurrencyConverter>, currency: &str, multi_bid_max: usize) -> Self {
        Self {
            rates,
            currency: currency.to_string(),
            multi_bid_max: multi_bid_max.max(1),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    fn incomparable(&self, bid: &Bid, to: &str) -> Warning {
        Warning::CurrencyIncomparable {
            bidder: bid.bidder.clone(),
            bid_id: bid.id.clone(),
            from: bid.price.currency.clone(),
            to: to.to_string(),
        }
    }

    /// floor 过滤 + 计算排名键，结果按胜出顺序排好
    fn rank<'b>(&self, slot: &ImpSlot, bids: &[&'b Bid]) -> Ranking<'b> {
        let mut ranking = Ranking {
            viable: Vec::new(),
            rejected: Vec::new(),
            warnings: Vec::new(),
        };
        for bid in bids {
            let deal = bid.deal_id.as_deref().and_then(|id| slot.deal(id));
            let floor = deal.and_then(|d| d.floor()).or(slot.floor.as_ref());

            if let Some(floor) = floor {
                match self.rates.convert(bid.price.value, &bid.price.currency, &floor.currency) {
                    Ok(value) if value < floor.value => {
                        ranking.rejected.push((*bid, Verdict::BelowFloor));
                        continue;
                    }
                    Ok(_) => {}
                    Err(_) => {
                        ranking.warnings.push(self.incomparable(bid, &floor.currency));
                        ranking.rejected.push((*bid, Verdict::CurrencyIncomparable));
                        continue;
                    }
                }
            }

            let price = match self.rates.convert(bid.price.value, &bid.price.currency, &self.currency) {
                Ok(price) => price,
                Err(_) => {
                    ranking.warnings.push(self.incomparable(bid, &self.currency));
                    ranking.rejected.push((*bid, Verdict::CurrencyIncomparable));
                    continue;
                }
            };
            let standing = match deal {
                Some(d) => Standing::Deal { rank: d.priority, price, seq: bid.seq },
                None => Standing::OpenMarket { price, seq: bid.seq },
            };
            ranking.viable.push((standing, *bid));
        }
        ranking.viable.sort_by(|a, b| a.0.cmp(&b.0));
        ranking
    }

    /// 当前已知出价中最后一个会被返回的位置（winner + runner-ups）的排名键。
    /// 不足 `multi_bid_max` 个可用出价时返回 None。dominance 判断用，不产生 warning。
    pub fn cutoff_standing(&self, slot: &ImpSlot, bids: &[&Bid]) -> Option<Standing> {
        self.rank(slot, bids)
            .viable
            .get(self.multi_bid_max - 1)
            .map(|(s, _)| *s)
    }

    /// 对单个 imp 选出 winner
    pub fn resolve_slot(&self, slot: &ImpSlot, bids: &[&Bid]) -> (AuctionResult, Vec<Warning>) {
        let Ranking {
            viable,
            rejected,
            warnings,
        } = self.rank(slot, bids);

        let mut considered = Vec::with_capacity(viable.len() + rejected.len());
        for (position, (_, bid)) in viable.iter().enumerate() {
            let verdict = match position {
                0 => Verdict::Won,
                p if p < self.multi_bid_max => Verdict::RunnerUp,
                _ => Verdict::Outranked,
            };
            considered.push(considered_bid(bid, verdict));
        }
        considered.extend(rejected.iter().map(|(bid, verdict)| considered_bid(bid, *verdict)));

        let winner = viable.first().map(|(_, bid)| (*bid).clone());
        let runner_ups = viable
            .iter()
            .skip(1)
            .take(self.multi_bid_max - 1)
            .map(|(_, bid)| (*bid).clone())
            .collect();
        let deals = evaluate_deals(slot, &viable, &rejected);

        let result = AuctionResult {
            imp_id: slot.id.clone(),
            outcome: SlotOutcome::from(viable.first().map(|(s, _)| s)),
            winner,
            runner_ups,
            considered,
            deals,
        };
        (result, warnings)
    }

    /// 所有 imp 独立求解；输入顺序不影响结果
    pub fn resolve(&self, slots: &[ImpSlot], bids: &[Bid]) -> (Vec<AuctionResult>, Vec<Warning>) {
        let mut by_imp: HashMap<&str, Vec<&Bid>> = HashMap::new();
        for bid in bids {
            by_imp.entry(bid.imp_id.as_str()).or_default().push(bid);
        }
        let mut results = Vec::with_capacity(slots.len());
        let mut warnings = Vec::new();
        for slot in slots {
            let slot_bids = by_imp.remove(slot.id.as_str()).unwrap_or_default();
            let (result, mut slot_warnings) = self.resolve_slot(slot, &slot_bids);
            results.push(result);
            warnings.append(&mut slot_warnings);
        }
        (results, warnings)
    }
}

fn considered_bid(bid: &Bid, verdict: Verdict) -> ConsideredBid {
    ConsideredBid {
        bid_id: bid.id.clone(),
        bidder: bid.bidder.clone(),
        deal_id: bid.deal_id.clone(),
        price: bid.price.clone(),
        verdict,
    }
}

fn evaluate_deals(slot: &ImpSlot, viable: &[(Standing, &Bid)], rejected: &[(&Bid, Verdict)]) -> Vec<DealEvaluation> {
    let winner = viable.first().map(|(_, bid)| *bid);
    let winner_label = winner.map(|w| {
        w.deal_id
            .as_deref()
            .and_then(|id| slot.deal(id))
            .map(|d| d.line_item_id.clone())
            .unwrap_or_else(|| format!("{}:{}", w.bidder, w.id))
    });
    slot.deals
        .iter()
        .map(|deal| {
            let carries = |bid: &Bid| bid.deal_id.as_deref() == Some(deal.deal_id.as_str());
            let verdict = if winner.map_or(false, |w| carries(w)) {
                DealVerdict::Won
            } else if viable.iter().any(|(_, bid)| carries(bid)) {
                DealVerdict::Outranked {
                    by: winner_label.clone().unwrap_or_default(),
                }
            } else if rejected.iter().any(|(bid, v)| carries(bid) && *v == Verdict::BelowFloor) {
                DealVerdict::BelowFloor
            } else {
                DealVerdict::NoValidBid
            };
            DealEvaluation {
                line_item_id: deal.line_item_id.clone(),
                deal_id: deal.deal_id.clone(),
                priority: deal.priority,
                verdict,
            }
        })
        .collect()
}
