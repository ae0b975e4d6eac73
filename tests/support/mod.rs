#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_hb::bidding::engine::AuctionEngine;
use rust_hb::bidding::transport::{BidderTransport, OutboundCall, RawReply};
use rust_hb::config::AuctionConfig;
use rust_hb::error::TransportError;
use rust_hb::model::bidder::BidderConfig;
use rust_hb::model::deals::{DealCandidate, DealTerms, LineItem, StaticLineItemPlanner, Targeting};
use rust_hb::model::request::{AuctionRequest, ImpRequest};
use rust_hb::model::slot::{AdType, Format};
use rust_hb::openrtb::request::BidRequest;

pub type Reply = Result<RawReply, TransportError>;

/// 根据出站请求（bidder endpoint + 解析后的 OpenRTB 请求）决定延迟和回包
pub struct ScriptedTransport {
    script: Box<dyn Fn(&str, &BidRequest) -> (u64, Reply) + Send + Sync>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: impl Fn(&str, &BidRequest) -> (u64, Reply) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl BidderTransport for ScriptedTransport {
    fn send(&self, call: OutboundCall, _timeout: Duration) -> BoxFuture<'static, Reply> {
        let request: BidRequest = serde_json::from_slice(&call.body).expect("adapter sends OpenRTB JSON");
        self.calls.lock().unwrap().push(call.url.clone());
        let (delay, reply) = (self.script)(&call.url, &request);
        async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            reply
        }
        .boxed()
    }
}

/// 对请求中的每个 imp 出价；deal 请求回填 deal id
pub fn bid_reply(request: &BidRequest, price: f64) -> Reply {
    let deal = request.first_deal_id().map(str::to_string);
    let bids: Vec<_> = request
        .imp
        .iter()
        .map(|imp| {
            json!({
                "id": format!("{}-{}", imp.id, deal.as_deref().unwrap_or("open")),
                "impid": imp.id,
                "price": price,
                "adm": "<div>ad</div>",
                "dealid": deal,
                "mtype": if imp.video.is_some() { 2 } else { 1 },
            })
        })
        .collect();
    let body = json!({"id": request.id, "cur": "USD", "seatbid": [{"bid": bids, "seat": "s1"}]});
    Ok(RawReply {
        status: 200,
        body: serde_json::to_vec(&body).unwrap(),
    })
}

pub fn no_bid() -> Reply {
    Ok(RawReply {
        status: 204,
        body: Vec::new(),
    })
}

pub fn malformed() -> Reply {
    Ok(RawReply {
        status: 200,
        body: b"{\"id\": \"oops\", \"seatbid\": [".to_vec(),
    })
}

pub fn endpoint(bidder: &str) -> String {
    format!("mem://{}", bidder)
}

pub fn open_bidder(name: &str) -> BidderConfig {
    BidderConfig::new(name, &endpoint(name))
}

/// 只承接 deal 的 bidder
pub fn deal_bidder(name: &str) -> BidderConfig {
    BidderConfig {
        open_market: false,
        ..BidderConfig::new(name, &endpoint(name))
    }
}

pub fn config(bidders: Vec<BidderConfig>) -> AuctionConfig {
    AuctionConfig {
        bidders,
        ..AuctionConfig::default()
    }
}

/// deal `d{rank}`，由 `bidder{rank}` 承接
pub fn deal_line_item(rank: u32) -> LineItem {
    LineItem {
        candidate: DealCandidate {
            line_item_id: format!("li-{}", rank),
            deal_id: format!("d{}", rank),
            priority: rank,
            terms: DealTerms::Open,
            bidder: Some(format!("bidder{}", rank)),
        },
        targeting: Targeting::default(),
    }
}

/// 三个互相竞争的 deal（rank 1/2/3），每个 deal 由单独的 bidder 承接
pub fn three_deal_engine(transport: Arc<ScriptedTransport>) -> AuctionEngine {
    multi_bid_three_deal_engine(transport, 1)
}

pub fn multi_bid_three_deal_engine(transport: Arc<ScriptedTransport>, multi_bid_max: usize) -> AuctionEngine {
    let bidders = (1..=3).map(|r| deal_bidder(&format!("bidder{}", r))).collect();
    let planner = StaticLineItemPlanner::new((1..=3).map(deal_line_item).collect());
    let cfg = AuctionConfig {
        multi_bid_max,
        ..config(bidders)
    };
    AuctionEngine::new(cfg, transport).with_planner(Arc::new(planner))
}

pub fn imp(id: &str, ad_type: AdType) -> ImpRequest {
    ImpRequest {
        id: id.to_string(),
        ad_type,
        sizes: vec![Format { w: 300, h: 250 }],
        bidfloor: None,
        bidfloorcur: None,
    }
}

pub fn auction(imps: Vec<ImpRequest>, tmax: u64) -> AuctionRequest {
    AuctionRequest {
        id: "auction-1".to_string(),
        imp: imps,
        tmax: Some(tmax),
        debug: true,
        bidders: None,
        blocked_bidders: Vec::new(),
    }
}

/// 从 endpoint 中取出 bidder 名字里的 rank（`mem://bidder2` -> 2）
pub fn rank_of(url: &str) -> usize {
    url.trim_start_matches("mem://bidder").parse().unwrap_or(0)
}
