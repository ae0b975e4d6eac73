// src/bidding/budget.rs

use std::time::Duration;
use tokio::time::Instant;

use crate::error::AuctionError;

/// 为 dispatch 之后的步骤预留的时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overhead {
    pub cache_write: Duration,
    pub serialization: Duration,
}

impl Overhead {
    pub fn total(&self) -> Duration {
        self.cache_write + self.serialization
    }
}

/// **单个 auction 共享的 deadline**
///
/// 一经创建不可延长。dispatcher 使用 `bidding_ends`，cache coordinator 使用 `cache_ends`，
/// `cache_ends` 之后剩下的是响应序列化的预留时间。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    requested: Duration,
    bidding_ends: Instant,
    cache_ends: Instant,
}

/// 根据请求的 tmax 和预留开销创建 deadline
pub fn new_budget(requested: Duration, overhead: Overhead) -> Result<Deadline, AuctionError> {
    new_budget_at(Instant::now(), requested, overhead)
}

pub fn new_budget_at(
    started: Instant,
    requested: Duration,
    overhead: Overhead,
) -> Result<Deadline, AuctionError> {
    let reserved = overhead.total();
    if requested <= reserved {
        return Err(AuctionError::InvalidTimeout { requested, reserved });
    }
    let bidding_ends = started + (requested - reserved);
    Ok(Deadline {
        started,
        requested,
        bidding_ends,
        cache_ends: bidding_ends + overhead.cache_write,
    })
}

impl Deadline {
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn requested(&self) -> Duration {
        self.requested
    }

    pub fn bidding_ends(&self) -> Instant {
        self.bidding_ends
    }

    pub fn cache_ends(&self) -> Instant {
        self.cache_ends
    }

    pub fn remaining_for_bidding(&self) -> Duration {
        self.bidding_ends.saturating_duration_since(Instant::now())
    }

    pub fn remaining_for_cache(&self) -> Duration {
        self.cache_ends.saturating_duration_since(Instant::now())
    }

    pub fn bidding_expired(&self) -> bool {
        Instant::now() >= self.bidding_ends
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overhead(cache: u64, ser: u64) -> Overhead {
        Overhead {
            cache_write: Duration::from_millis(cache),
            serialization: Duration::from_millis(ser),
        }
    }

    #[test]
    fn rejects_timeout_not_above_overhead() {
        let err = new_budget(Duration::from_millis(40), overhead(30, 10)).unwrap_err();
        assert_eq!(
            err,
            AuctionError::InvalidTimeout {
                requested: Duration::from_millis(40),
                reserved: Duration::from_millis(40),
            }
        );
        assert!(new_budget(Duration::ZERO, Overhead::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn phases_are_laid_out_from_start() {
        let start = Instant::now();
        let d = new_budget_at(start, Duration::from_millis(200), overhead(30, 10)).unwrap();
        assert_eq!(d.bidding_ends() - start, Duration::from_millis(160));
        assert_eq!(d.cache_ends() - start, Duration::from_millis(190));
        assert_eq!(d.remaining_for_bidding(), Duration::from_millis(160));

        tokio::time::advance(Duration::from_millis(170)).await;
        assert!(d.bidding_expired());
        assert_eq!(d.remaining_for_bidding(), Duration::ZERO);
        assert_eq!(d.remaining_for_cache(), Duration::from_millis(20));
    }
}
