// src/bidding/engine.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bidding::assembler::{assemble, AssembleInput, AuctionResponse};
use crate::bidding::budget::new_budget;
use crate::bidding::cache::{drop_uncached_video, CacheCoordinator, CreativeCache, DisabledCache, HttpCreativeCache};
use crate::bidding::dispatcher::{BidderRequest, Dispatcher};
use crate::bidding::resolver::Resolver;
use crate::bidding::transport::BidderTransport;
use crate::bidding::validator::{RequestStatus, Validator};
use crate::config::config_manager::AuctionConfig;
use crate::error::{AuctionError, CacheError, Warning};
use crate::logging::auction_log::{AuctionLog, BidderCallLog, WinnerLog};
use crate::logging::writer::AuctionLogWriter;
use crate::model::adapters::{BidderAdapter, OpenRtbAdapter};
use crate::model::bidder::BidderRegistry;
use crate::model::context::{build_slots, AuctionContext};
use crate::model::currency::{CurrencyConverter, StaticRates};
use crate::model::deals::{LineItemPlanner, NoDeals};
use crate::model::request::AuctionRequest;
use crate::model::slot::ImpSlot;

/// **AuctionEngine：`run_auction` 的入口**
/// 持有所有协作方，本身不保存任何 auction 之间的可变状态。
pub struct AuctionEngine {
    config: AuctionConfig,
    registry: BidderRegistry,
    transport: Arc<dyn BidderTransport>,
    adapters: BTreeMap<String, Arc<dyn BidderAdapter>>,
    planner: Arc<dyn LineItemPlanner>,
    cache: CacheCoordinator,
    validator: Validator,
    resolver: Resolver,
    auction_log: Option<Arc<AuctionLogWriter>>,
}

impl AuctionEngine {
    /// 每个配置的 bidder 默认使用通用 OpenRTB adapter
    pub fn new(config: AuctionConfig, transport: Arc<dyn BidderTransport>) -> Self {
        let adapters = config
            .bidders
            .iter()
            .map(|b| {
                let adapter: Arc<dyn BidderAdapter> = Arc::new(OpenRtbAdapter::new(b.clone(), &config.ad_server_currency));
                (b.name.clone(), adapter)
            })
            .collect();
        let cache: Arc<dyn CreativeCache> = match &config.cache {
            Some(c) => Arc::new(HttpCreativeCache::new(&c.url, Duration::from_millis(c.timeout_ms))),
            None => Arc::new(DisabledCache),
        };
        let rates: Arc<dyn CurrencyConverter> = Arc::new(StaticRates::new(config.currency_rates.clone()));
        Self {
            registry: config.registry(),
            validator: Validator::new(&config.ad_server_currency),
            resolver: Resolver::new(rates, &config.ad_server_currency, config.multi_bid_max),
            cache: CacheCoordinator::new(cache),
            planner: Arc::new(NoDeals),
            auction_log: None,
            transport,
            adapters,
            config,
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn LineItemPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CreativeCache>) -> Self {
        self.cache = CacheCoordinator::new(cache);
        self
    }

    pub fn with_rates(mut self, rates: Arc<dyn CurrencyConverter>) -> Self {
        self.resolver = Resolver::new(rates, &self.config.ad_server_currency, self.config.multi_bid_max);
        self
    }

    /// 注册（或替换）某个 bidder 的 adapter
    pub fn with_adapter(mut self, adapter: Arc<dyn BidderAdapter>) -> Self {
        self.adapters.insert(adapter.bidder().to_string(), adapter);
        self
    }

    pub fn with_auction_log(mut self, writer: Arc<AuctionLogWriter>) -> Self {
        self.auction_log = Some(writer);
        self
    }

    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    /// **一次完整的 auction**
    ///
    /// 只有 `InvalidTimeout` 和内部不变量被破坏会返回错误，bidder/cache 的失败都记录在响应里。
    pub async fn run_auction(&self, request: AuctionRequest) -> Result<AuctionResponse, AuctionError> {
        let tmax = self.config.effective_tmax(request.tmax);
        let deadline = new_budget(tmax, self.config.overhead()).map_err(|e| {
            warn!(auction_id = %request.id, error = %e, "auction rejected before dispatch");
            e
        })?;

        let slots = build_slots(&request, self.planner.as_ref(), &self.config.ad_server_currency);
        let mut ctx = AuctionContext::new(request, deadline, slots);
        self.build_requests(&mut ctx);
        info!(
            auction_id = %ctx.request.id,
            imps = ctx.slots.len(),
            requests = ctx.requests.len(),
            tmax_ms = tmax.as_millis() as u64,
            "auction started"
        );

        let outcome = Dispatcher::new(&self.transport, &self.adapters)
            .dispatch(&ctx.requests, &ctx.slots, &ctx.deadline, &self.validator, &self.resolver)
            .await;
        ctx.record_dispatch(outcome);

        let bids = ctx.bids();
        let (results, warnings) = self.resolver.resolve(&ctx.slots, &bids);
        ctx.results = results;
        ctx.warnings.extend(warnings);

        let cached = self.cache.cache(&ctx.returned_bids(), &ctx.deadline).await;
        match &cached.error {
            None | Some(CacheError::Disabled) => {}
            Some(err) => {
                ctx.warnings.push(Warning::CacheUnavailable(err.to_string()));
                if self.config.require_cache_for_video {
                    let dropped = drop_uncached_video(&mut ctx.results, &cached.refs);
                    ctx.warnings.extend(dropped);
                }
            }
        }

        let debug = ctx.request.debug && self.config.allow_debug;
        let response = assemble(AssembleInput {
            auction_id: &ctx.request.id,
            currency: self.resolver.currency(),
            tmax_ms: tmax.as_millis() as u64,
            slots: &ctx.slots,
            requests: &ctx.requests,
            responses: &ctx.responses,
            results: std::mem::take(&mut ctx.results),
            cache_refs: &cached.refs,
            warnings: &ctx.warnings,
            exit: ctx.exit,
            debug,
        })?;

        info!(
            auction_id = %response.id,
            winners = response.bids.len(),
            early_exit = ctx.early_exit(),
            elapsed_ms = ctx.deadline.elapsed().as_millis() as u64,
            "auction finished"
        );
        if let Some(writer) = &self.auction_log {
            writer.log(&auction_log(&ctx, &response));
        }
        Ok(response)
    }

    /// 对每个有资格的 bidder，按 adapter 的拆分方案生成出站请求
    fn build_requests(&self, ctx: &mut AuctionContext) {
        for (name, adapter) in &self.adapters {
            if self.registry.get_bidder(name).map_or(false, |b| !b.enabled) {
                continue;
            }
            if !ctx.request.allows_bidder(name) {
                ctx.warnings.push(Warning::BidderSkipped {
                    bidder: name.clone(),
                    reason: "excluded by request".to_string(),
                });
                continue;
            }
            let window = ctx.deadline.remaining_for_bidding();
            for plan in adapter.partition(&ctx.slots) {
                let targeted: Vec<&ImpSlot> = ctx.slots.iter().filter(|s| plan.imp_ids.contains(&s.id)).collect();
                if targeted.is_empty() {
                    continue;
                }
                match adapter.build_request(&ctx.request.id, window, &targeted, plan.deal.as_ref()) {
                    Ok(call) => ctx.requests.push(BidderRequest {
                        bidder: name.clone(),
                        imp_ids: plan.imp_ids,
                        deal: plan.deal,
                        call,
                    }),
                    Err(e) => {
                        debug!(bidder = %name, error = %e, "adapter could not build request");
                        ctx.warnings.push(Warning::BidderSkipped {
                            bidder: name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

fn auction_log(ctx: &AuctionContext, response: &AuctionResponse) -> AuctionLog {
    let mut log = AuctionLog::new(&ctx.request.id);
    log.early_exit = ctx.early_exit();
    log.elapsed_ms = ctx.deadline.elapsed().as_millis() as u64;
    for (request, validated) in ctx.requests.iter().zip(&ctx.responses) {
        log.add_bidder_call(BidderCallLog {
            bidder: request.bidder.clone(),
            url: request.call.url.clone(),
            line_item_id: request.deal.as_ref().map(|d| d.line_item_id.clone()),
            status: validated.status.label().to_string(),
            bids: match validated.status {
                RequestStatus::Bids(n) => n,
                _ => 0,
            },
            elapsed_ms: validated.elapsed.map(|e| e.as_millis() as u64),
        });
    }
    for slot_bid in &response.bids {
        log.add_winner(WinnerLog {
            imp_id: slot_bid.imp_id.clone(),
            bidder: slot_bid.bid.bidder.clone(),
            bid_id: slot_bid.bid.id.clone(),
            price: slot_bid.bid.price.value,
            deal_id: slot_bid.bid.deal_id.clone(),
        });
    }
    log.warnings = ctx
        .responses
        .iter()
        .flat_map(|r| r.warnings.iter())
        .chain(&ctx.warnings)
        .map(|w| w.to_string())
        .collect();
    log
}
