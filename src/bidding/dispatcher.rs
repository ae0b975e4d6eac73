// src/bidding/dispatcher.rs

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::bidding::budget::Deadline;
use crate::bidding::dominance;
use crate::bidding::resolver::Resolver;
use crate::bidding::transport::{BidderTransport, OutboundCall};
use crate::bidding::validator::{ValidatedResponse, Validator};
use crate::error::{BidderError, TransportError};
use crate::model::adapters::BidderAdapter;
use crate::model::bid::{Bid, RawBid};
use crate::model::deals::DealCandidate;
use crate::model::slot::ImpSlot;

/// 一个出站工作单元：bidder + 覆盖的 imp +（可选）代表的 deal
#[derive(Debug, Clone, PartialEq)]
pub struct BidderRequest {
    pub bidder: String,
    pub imp_ids: Vec<String>,
    pub deal: Option<DealCandidate>,
    pub call: OutboundCall,
}

/// 一个 BidderRequest 的原始结果
#[derive(Debug, Clone)]
pub struct BidderResponse {
    /// 在本次 auction 请求列表中的下标
    pub index: usize,
    pub bidder: String,
    pub outcome: Result<Vec<RawBid>, BidderError>,
    pub elapsed: Duration,
}

/// dispatch 为什么结束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// 所有请求都有了结果
    Complete,
    /// 所有 imp 的 winner 已确定，剩余请求被放弃
    Dominant,
    /// deadline 到期，剩余请求记为超时
    Deadline,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// 与请求列表一一对应
    pub responses: Vec<ValidatedResponse>,
    pub exit: DispatchExit,
}

/// **Dispatcher**：并发发出所有 BidderRequest，共享同一个 deadline
pub struct Dispatcher<'a> {
    transport: &'a Arc<dyn BidderTransport>,
    adapters: &'a BTreeMap<String, Arc<dyn BidderAdapter>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        transport: &'a Arc<dyn BidderTransport>,
        adapters: &'a BTreeMap<String, Arc<dyn BidderAdapter>>,
    ) -> Self {
        Self { transport, adapters }
    }

    /// 并发获取所有 bidder 的响应
    ///
    /// 每完成一个请求就校验它的出价，并在已知出价上重新判断 dominance；
    /// 一旦所有 imp 都已确定就提前返回，剩余请求标记为 abandoned 并取消。
    pub async fn dispatch(
        &self,
        requests: &[BidderRequest],
        slots: &[ImpSlot],
        deadline: &Deadline,
        validator: &Validator,
        resolver: &Resolver,
    ) -> DispatchOutcome {
        let mut outcomes: Vec<Option<ValidatedResponse>> = (0..requests.len()).map(|_| None).collect();
        let mut abort_handles = Vec::with_capacity(requests.len());
        let mut in_flight = FuturesUnordered::new();

        for (index, request) in requests.iter().enumerate() {
            let adapter = match self.adapters.get(&request.bidder) {
                Some(adapter) => adapter.clone(),
                None => {
                    let raw = BidderResponse {
                        index,
                        bidder: request.bidder.clone(),
                        outcome: Err(BidderError::Transport("no adapter registered".to_string())),
                        elapsed: Duration::ZERO,
                    };
                    outcomes[index] = Some(validator.validate(raw, request, slots));
                    continue;
                }
            };
            let handle = tokio::spawn(call_bidder(
                self.transport.clone(),
                adapter,
                request.call.clone(),
                deadline.bidding_ends(),
                index,
                request.bidder.clone(),
            ));
            abort_handles.push((index, handle.abort_handle()));
            in_flight.push(async move { (index, handle.await) });
        }

        debug!(
            requests = requests.len(),
            in_flight = in_flight.len(),
            remaining_ms = deadline.remaining_for_bidding().as_millis() as u64,
            "bidder requests dispatched"
        );

        // 各任务只返回自己的结果，这里是唯一的汇聚点
        let mut known: Vec<Bid> = outcomes.iter().flatten().flat_map(|o| o.bids.iter().cloned()).collect();
        let mut exit = DispatchExit::Complete;
        let expiry = sleep_until(deadline.bidding_ends());
        tokio::pin!(expiry);

        while !in_flight.is_empty() {
            tokio::select! {
                biased;
                Some((index, joined)) = in_flight.next() => {
                    let raw = joined.unwrap_or_else(|e| BidderResponse {
                        index,
                        bidder: requests[index].bidder.clone(),
                        outcome: Err(BidderError::Transport(format!("bidder task failed: {}", e))),
                        elapsed: deadline.elapsed(),
                    });
                    let validated = validator.validate(raw, &requests[index], slots);
                    debug!(
                        bidder = %validated.bidder,
                        index,
                        status = validated.status.label(),
                        bids = validated.bids.len(),
                        "bidder request finished"
                    );
                    known.extend(validated.bids.iter().cloned());
                    outcomes[index] = Some(validated);

                    let pending: Vec<&BidderRequest> = requests
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| outcomes[*i].is_none())
                        .map(|(_, r)| r)
                        .collect();
                    if !pending.is_empty() && dominance::all_settled(slots, &known, &pending, resolver) {
                        info!(abandoned = pending.len(), "all winners dominant, abandoning pending bidder requests");
                        exit = DispatchExit::Dominant;
                        break;
                    }
                }
                _ = &mut expiry => {
                    warn!(pending = in_flight.len(), "auction deadline reached with bidder requests in flight");
                    exit = DispatchExit::Deadline;
                    break;
                }
            }
        }

        // 取消仍在进行的调用，迟到的结果直接丢弃
        for (index, handle) in &abort_handles {
            if outcomes[*index].is_none() {
                handle.abort();
            }
        }

        let responses = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.unwrap_or_else(|| {
                    let bidder = &requests[index].bidder;
                    match exit {
                        DispatchExit::Dominant => ValidatedResponse::abandoned(index, bidder),
                        _ => {
                            let raw = BidderResponse {
                                index,
                                bidder: bidder.clone(),
                                outcome: Err(BidderError::Timeout),
                                elapsed: deadline.elapsed(),
                            };
                            validator.validate(raw, &requests[index], slots)
                        }
                    }
                })
            })
            .collect();

        DispatchOutcome { responses, exit }
    }
}

/// 单个出站调用：共享 deadline 即该请求的超时
async fn call_bidder(
    transport: Arc<dyn BidderTransport>,
    adapter: Arc<dyn BidderAdapter>,
    call: OutboundCall,
    ends: Instant,
    index: usize,
    bidder: String,
) -> BidderResponse {
    let started = Instant::now();
    let remaining = ends.saturating_duration_since(started);
    let outcome = match timeout_at(ends, transport.send(call, remaining)).await {
        Err(_) | Ok(Err(TransportError::Timeout)) => Err(BidderError::Timeout),
        Ok(Err(e)) => Err(BidderError::Transport(e.to_string())),
        Ok(Ok(reply)) if reply.is_no_content() => Err(BidderError::NoBid),
        Ok(Ok(reply)) if !reply.is_success() => {
            Err(BidderError::Transport(format!("unexpected status {}", reply.status)))
        }
        Ok(Ok(reply)) => adapter
            .parse_response(&reply)
            .map_err(|e| BidderError::InvalidResponse(e.to_string())),
    };
    BidderResponse {
        index,
        bidder,
        outcome,
        elapsed: started.elapsed(),
    }
}
