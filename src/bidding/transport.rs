// src/bidding/transport.rs

use futures::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

use crate::error::TransportError;

/// 进程级共享的 HTTP 连接池，所有 auction 复用
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(64)
        .tcp_nodelay(true)
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// 一次出站调用（由 bidder adapter 生成）
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// 下游原始回包
#[derive(Debug, Clone, PartialEq)]
pub struct RawReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn is_no_content(&self) -> bool {
        self.status == 204 || (self.status == 200 && self.body.iter().all(|b| b.is_ascii_whitespace()))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 出站调用的抽象，dispatcher 只依赖这个 trait
pub trait BidderTransport: Send + Sync {
    fn send(&self, call: OutboundCall, timeout: Duration) -> BoxFuture<'static, Result<RawReply, TransportError>>;
}

/// 基于 reqwest 的 HTTP 实现
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(err.to_string())
    }
}

impl BidderTransport for HttpTransport {
    fn send(&self, call: OutboundCall, timeout: Duration) -> BoxFuture<'static, Result<RawReply, TransportError>> {
        let client = self.client.clone();
        async move {
            let mut request = client
                .post(&call.url)
                .timeout(timeout)
                .header("Content-Type", "application/json")
                .body(call.body);
            for (name, value) in call.headers {
                request = request.header(name, value);
            }
            let response = request.send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;
            Ok(RawReply {
                status,
                body: body.to_vec(),
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_classification() {
        assert!(RawReply { status: 204, body: vec![] }.is_no_content());
        assert!(RawReply { status: 200, body: b"  \n".to_vec() }.is_no_content());
        assert!(!RawReply { status: 200, body: b"{}".to_vec() }.is_no_content());
        assert!(!RawReply { status: 503, body: vec![] }.is_success());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let transport = HttpTransport::new();
        let call = OutboundCall {
            url: "http://127.0.0.1:1/bid".to_string(),
            headers: Vec::new(),
            body: b"{}".to_vec(),
        };
        let result = transport.send(call, Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
