// src/main.rs

use axum::serve;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use rust_hb::api;
use rust_hb::bidding::engine::AuctionEngine;
use rust_hb::bidding::transport::HttpTransport;
use rust_hb::config::{AuctionConfig, ConfigManager};
use rust_hb::logging::writer::{AuctionLogWriter, WriterSettings};
use rust_hb::mock_bidder::{self, MockBehavior};
use rust_hb::model::bidder::BidderConfig;
use rust_hb::model::deals::StaticLineItemPlanner;
use rust_hb::AppState;

#[derive(Parser, Debug)]
#[command(author = "whiteCcinn", version = "1.0", about = "A deal-aware header-bidding auction server")]
struct CliArgs {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value = "logs")]
    log_dir: String,
    /// auction 配置文件（JSON），缺省时使用内置默认值
    #[arg(short, long)]
    config: Option<String>,
    /// 同时在该端口启动 mock bidder
    #[arg(long)]
    mock_bidder_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    // 全局 tracing 日志：JSON 格式，按小时滚动
    let log_file = rolling::hourly(&args.log_dir, "rust_hb.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)?;
    info!("auction server starting on port {}", args.port);

    let mut config = match &args.config {
        Some(path) => ConfigManager::load(path)?,
        None => AuctionConfig::default(),
    };

    if let Some(port) = args.mock_bidder_port {
        let addr = mock_bidder::start_mock_bidder(port, MockBehavior::default()).await?;
        if config.bidders.is_empty() {
            config.bidders.push(BidderConfig::new("mock", &format!("http://{}/bid", addr)));
        }
    }
    if config.bidders.is_empty() {
        warn!("no bidders configured, every auction will be empty");
    }

    let auction_log = AuctionLogWriter::new(&args.log_dir, "auction_log.json", WriterSettings::default());
    let mut engine = AuctionEngine::new(config.clone(), Arc::new(HttpTransport::new()))
        .with_auction_log(auction_log.clone());
    if let Some(path) = &config.line_items_file {
        engine = engine.with_planner(Arc::new(StaticLineItemPlanner::from_file(path)?));
    }

    let state = Arc::new(AppState {
        engine: Arc::new(engine),
    });
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("auction server listening on http://{}", listener.local_addr()?);

    serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down gracefully");
        })
        .await?;

    auction_log.flush().await;
    info!("auction server shut down");
    Ok(())
}
