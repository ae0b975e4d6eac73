// src/lib.rs

pub mod api;
pub mod bidding;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock_bidder;
pub mod model;
pub mod openrtb;

use std::sync::Arc;

use bidding::engine::AuctionEngine;

/// HTTP 层共享的状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuctionEngine>,
}
