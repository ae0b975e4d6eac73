// src/mock_bidder.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, serve, Json, Router};
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::openrtb::request::{BidRequest, Imp};
use crate::openrtb::response::{Bid, BidResponse, SeatBid};

/// mock bidder 的行为
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// 处理延迟（毫秒），每次请求随机取值
    pub delay_ms: Range<u64>,
    /// 固定出价；None 时在底价上随机加价
    pub cpm: Option<f64>,
    /// 为 true 时一律返回 204
    pub no_bid: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            delay_ms: 20..80,
            cpm: None,
            no_bid: false,
        }
    }
}

fn price_for(imp: &Imp, behavior: &MockBehavior) -> f64 {
    if let Some(cpm) = behavior.cpm {
        return cpm;
    }
    let floor = imp
        .pmp
        .as_ref()
        .and_then(|p| p.deals.first())
        .and_then(|d| d.bidfloor)
        .or(imp.bidfloor)
        .unwrap_or(0.5);
    let multiplier: f64 = if imp.video.is_some() {
        rand::thread_rng().gen_range(1.0..2.5)
    } else if imp.native.is_some() {
        rand::thread_rng().gen_range(0.8..2.0)
    } else {
        rand::thread_rng().gen_range(1.0..3.0)
    };
    // 不低于底价
    floor * multiplier.max(1.0)
}

fn markup_for(imp: &Imp, bid_id: &str) -> (String, u8) {
    if imp.video.is_some() {
        let vast = format!(
            r#"<VAST version="3.0"><Ad id="{bid_id}"><InLine><AdSystem>Mock Bidder</AdSystem><Impression><![CDATA[http://bidder-tracker.local/impression?bid={bid_id}]]></Impression></InLine></Ad></VAST>"#
        );
        (vast, 2)
    } else if imp.native.is_some() {
        let native = format!(
            r#"{{"native":{{"assets":[{{"title":{{"text":"Mock Native Ad"}}}}],"impression_tracking":"http://bidder-tracker.local/impression?bid={bid_id}"}}}}"#
        );
        (native, 4)
    } else {
        let html = format!(
            "<html><body>Mock Banner<img src=\"http://bidder-tracker.local/impression?bid={bid_id}\" style=\"display:none;\" /></body></html>"
        );
        (html, 1)
    }
}

/// 对每个 imp 出一个价；deal 请求回填 pmp 中的 deal id
async fn handle_bid(State(behavior): State<Arc<MockBehavior>>, Json(request): Json<BidRequest>) -> impl IntoResponse {
    info!(request_id = %request.id, imps = request.imp.len(), "mock bidder received request");

    let range = behavior.delay_ms.clone();
    let delay_ms = if range.is_empty() {
        range.start
    } else {
        rand::thread_rng().gen_range(range)
    };
    sleep(Duration::from_millis(delay_ms)).await;

    if behavior.no_bid {
        return StatusCode::NO_CONTENT.into_response();
    }

    let bids = request
        .imp
        .iter()
        .map(|imp| {
            let dealid = imp.pmp.as_ref().and_then(|p| p.deals.first()).map(|d| d.id.clone());
            let bid_id = match &dealid {
                Some(deal) => format!("bid-{}-{}", imp.id, deal),
                None => format!("bid-{}", imp.id),
            };
            let (adm, mtype) = markup_for(imp, &bid_id);
            Bid {
                price: price_for(imp, &behavior),
                impid: imp.id.clone(),
                adm: Some(adm),
                nurl: None,
                crid: Some(format!("creative-{}", imp.id)),
                dealid,
                w: imp.banner.as_ref().and_then(|b| b.format.first()).map(|f| f.w),
                h: imp.banner.as_ref().and_then(|b| b.format.first()).map(|f| f.h),
                mtype: Some(mtype),
                id: bid_id,
            }
        })
        .collect();

    Json(BidResponse {
        id: request.id.clone(),
        seatbid: vec![SeatBid {
            bid: bids,
            seat: Some("mock_seat".to_string()),
        }],
        bidid: None,
        cur: Some("USD".to_string()),
        nbr: None,
    })
    .into_response()
}

pub fn mock_router(behavior: MockBehavior) -> Router {
    Router::new()
        .route("/bid", post(handle_bid))
        .with_state(Arc::new(behavior))
}

/// 在已绑定的 listener 上运行 mock bidder，路由为 `/bid`
pub async fn serve_mock_bidder(listener: TcpListener, behavior: MockBehavior) -> io::Result<()> {
    let addr = listener.local_addr()?;
    info!("Mock bidder running at http://{}/bid", addr);
    serve(listener, mock_router(behavior)).await
}

/// 绑定端口并在后台运行，返回实际监听地址
pub async fn start_mock_bidder(port: u16, behavior: MockBehavior) -> io::Result<SocketAddr> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = serve_mock_bidder(listener, behavior).await {
            warn!(error = %e, "mock bidder stopped");
        }
    });
    Ok(addr)
}
