// src/bidding/cache.rs

use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout_at;
use tracing::{debug, warn};

use crate::bidding::budget::Deadline;
use crate::bidding::resolver::{AuctionResult, DealVerdict, SlotOutcome, Verdict};
use crate::bidding::transport::HTTP_CLIENT;
use crate::error::{CacheError, Warning};
use crate::model::bid::{Bid, BidSeq};
use crate::model::slot::AdType;

/// 缓存条目的内容类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Xml,
    Json,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CacheItem {
    #[serde(skip)]
    pub seq: BidSeq,
    #[serde(rename = "type")]
    pub kind: CacheKind,
    pub value: String,
}

/// creative cache 返回的引用
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheRef {
    pub uuid: String,
    pub url: String,
}

/// 外部 creative cache 的批量写入接口，返回的引用与输入一一对应
pub trait CreativeCache: Send + Sync {
    fn store(&self, items: Vec<CacheItem>, timeout: Duration) -> BoxFuture<'static, Result<Vec<CacheRef>, CacheError>>;
}

/// 未配置 cache 时使用
pub struct DisabledCache;

impl CreativeCache for DisabledCache {
    fn store(&self, _items: Vec<CacheItem>, _timeout: Duration) -> BoxFuture<'static, Result<Vec<CacheRef>, CacheError>> {
        async { Err(CacheError::Disabled) }.boxed()
    }
}

#[derive(Serialize)]
struct PutRequest<'a> {
    puts: &'a [CacheItem],
}

#[derive(Deserialize)]
struct PutResponse {
    responses: Vec<PutResponseEntry>,
}

#[derive(Deserialize)]
struct PutResponseEntry {
    uuid: String,
}

/// 基于 HTTP 的 creative cache 客户端（`{"puts":[...]}` -> `{"responses":[{"uuid":...}]}`）
pub struct HttpCreativeCache {
    client: Client,
    url: String,
    max_timeout: Duration,
}

impl HttpCreativeCache {
    pub fn new(url: &str, max_timeout: Duration) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            url: url.to_string(),
            max_timeout,
        }
    }
}

impl CreativeCache for HttpCreativeCache {
    fn store(&self, items: Vec<CacheItem>, timeout: Duration) -> BoxFuture<'static, Result<Vec<CacheRef>, CacheError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = timeout.min(self.max_timeout);
        async move {
            let response = client
                .post(&url)
                .timeout(timeout)
                .json(&PutRequest { puts: &items })
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        CacheError::Timeout
                    } else {
                        CacheError::Transport(e.to_string())
                    }
                })?;
            if !response.status().is_success() {
                return Err(CacheError::Status(response.status().as_u16()));
            }
            let body: PutResponse = response
                .json()
                .await
                .map_err(|e| CacheError::Malformed(e.to_string()))?;
            Ok(body
                .responses
                .into_iter()
                .map(|entry| CacheRef {
                    url: format!("{}?uuid={}", url, entry.uuid),
                    uuid: entry.uuid,
                })
                .collect())
        }
        .boxed()
    }
}

/// 缓存结果：引用表 + 可选的失败原因（失败不影响 auction）
#[derive(Debug, Default)]
pub struct CacheOutcome {
    pub refs: HashMap<BidSeq, CacheRef>,
    pub error: Option<CacheError>,
}

/// **Cache Coordinator**：一次批量写入，受 deadline 剩余时间约束，不重试
pub struct CacheCoordinator {
    cache: Arc<dyn CreativeCache>,
}

impl CacheCoordinator {
    pub fn new(cache: Arc<dyn CreativeCache>) -> Self {
        Self { cache }
    }

    pub async fn cache(&self, bids: &[&Bid], deadline: &Deadline) -> CacheOutcome {
        let items: Vec<CacheItem> = bids
            .iter()
            .filter_map(|bid| {
                bid.cacheable_markup().map(|markup| CacheItem {
                    seq: bid.seq,
                    kind: if bid.ad_type == AdType::Video { CacheKind::Xml } else { CacheKind::Json },
                    value: markup.to_string(),
                })
            })
            .collect();
        if items.is_empty() {
            return CacheOutcome::default();
        }

        let remaining = deadline.remaining_for_cache();
        if remaining.is_zero() {
            return CacheOutcome {
                refs: HashMap::new(),
                error: Some(CacheError::BudgetExhausted),
            };
        }

        let seqs: Vec<BidSeq> = items.iter().map(|i| i.seq).collect();
        let stored = match timeout_at(deadline.cache_ends(), self.cache.store(items, remaining)).await {
            Err(_) => Err(CacheError::Timeout),
            Ok(result) => result,
        };
        match stored {
            Ok(refs) if refs.len() == seqs.len() => {
                debug!(cached = refs.len(), "returned creatives cached");
                CacheOutcome {
                    refs: seqs.into_iter().zip(refs).collect(),
                    error: None,
                }
            }
            Ok(refs) => CacheOutcome {
                refs: HashMap::new(),
                error: Some(CacheError::Malformed(format!(
                    "expected {} cache refs, got {}",
                    seqs.len(),
                    refs.len()
                ))),
            },
            Err(err) => {
                if err != CacheError::Disabled {
                    warn!(error = %err, "creative cache unavailable, returning bids without cache refs");
                }
                CacheOutcome {
                    refs: HashMap::new(),
                    error: Some(err),
                }
            }
        }
    }
}

/// cache 失败时丢弃没有缓存引用的视频出价；banner/native 照常返回
///
/// winner 被丢弃时该 imp 变为 NoWin，runner-ups 随之一并丢弃（没有 winner 的 imp 不返回任何出价）。
/// 被丢弃的出价在 trace 中标记为 `uncached`。
pub fn drop_uncached_video(results: &mut [AuctionResult], refs: &HashMap<BidSeq, CacheRef>) -> Vec<Warning> {
    let uncached = |bid: &Bid| bid.ad_type == AdType::Video && !refs.contains_key(&bid.seq);
    let mut warnings = Vec::new();
    for result in results.iter_mut() {
        let mut dropped: Vec<Bid> = Vec::new();
        if result.winner.as_ref().map_or(false, |w| uncached(w)) {
            dropped.extend(result.winner.take());
            dropped.append(&mut result.runner_ups);
            result.outcome = SlotOutcome::NoWin;
            for deal in result.deals.iter_mut().filter(|d| d.verdict == DealVerdict::Won) {
                deal.verdict = DealVerdict::Uncached;
            }
        } else {
            let (gone, kept): (Vec<Bid>, Vec<Bid>) = std::mem::take(&mut result.runner_ups)
                .into_iter()
                .partition(|b| uncached(b));
            result.runner_ups = kept;
            dropped = gone;
        }

        for bid in dropped {
            if let Some(considered) = result
                .considered
                .iter_mut()
                .find(|c| c.bid_id == bid.id && c.bidder == bid.bidder)
            {
                considered.verdict = Verdict::Uncached;
            }
            warnings.push(Warning::UncachedBidDropped {
                bidder: bid.bidder,
                bid_id: bid.id,
            });
        }
    }
    warnings
}
