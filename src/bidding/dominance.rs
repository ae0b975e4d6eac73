// src/bidding/dominance.rs

use crate::bidding::dispatcher::BidderRequest;
use crate::bidding::resolver::{Resolver, Standing};
use crate::model::bid::Bid;
use crate::model::slot::ImpSlot;

/// **单个 imp 是否已经确定**
///
/// `cutoff` 是最后一个会被返回的位置（单出价时即 winner，multi-bid 时是最后一个 runner-up）。
/// 仍在等待的请求中，没有任何一个能挤进这些位置，即为确定：
/// - 没有等待中的请求覆盖该 imp；或
/// - cutoff 是 rank 为 r 的 deal 出价，而覆盖该 imp 的每个等待请求都代表 rank 严格大于 r 的 deal
///   （或该 imp 没有的 deal，只能算公开竞价）。
///
/// 公开竞价请求可能带回任意 deal 的出价，所以只要还有公开竞价请求在等待，该 imp 就不确定。
pub fn slot_settled(slot: &ImpSlot, cutoff: Option<&Standing>, pending: &[&BidderRequest]) -> bool {
    let mut covering = pending
        .iter()
        .filter(|r| r.imp_ids.iter().any(|id| *id == slot.id))
        .peekable();
    if covering.peek().is_none() {
        return true;
    }
    let cutoff_rank = match cutoff {
        Some(Standing::Deal { rank, .. }) => *rank,
        _ => return false,
    };
    covering.all(|request| match &request.deal {
        Some(deal) => match slot.deal(&deal.deal_id) {
            Some(candidate) => candidate.priority > cutoff_rank,
            None => true,
        },
        None => false,
    })
}

/// 在已知出价上重新计算每个 imp 的 cutoff，判断是否所有 imp 都已确定。
/// 纯函数：只依赖已知出价和等待中的请求，与到达顺序无关。
pub fn all_settled(slots: &[ImpSlot], known: &[Bid], pending: &[&BidderRequest], resolver: &Resolver) -> bool {
    slots.iter().all(|slot| {
        let slot_bids: Vec<&Bid> = known.iter().filter(|b| b.imp_id == slot.id).collect();
        let cutoff = resolver.cutoff_standing(slot, &slot_bids);
        slot_settled(slot, cutoff.as_ref(), pending)
    })
}
