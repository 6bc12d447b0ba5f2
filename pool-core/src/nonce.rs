//! Nonce reconciliation for out-of-order relay delivery
//!
//! Relay instructions carry a nonce assigned in order on the source domain
//! but may arrive in any order. The reconciler accepts each nonce at most
//! once:
//!
//! - `nonce >= watermark`: every nonce in `[watermark, nonce)` becomes a
//!   pending gap, the watermark moves to `nonce + 1`, and the nonce is
//!   accepted as the new frontier.
//! - `nonce < watermark`: accepted only if it is a pending gap, which is then
//!   removed. Anything else is a replay or was never announced.
//!
//! # Invariants
//!
//! - Every pending gap is below the watermark
//! - The watermark never decreases
//!
//! Gaps are kept as disjoint half-open intervals, so a frontier jump costs
//! one entry however far it skips.

use crate::{
    types::{Lane, Nonce},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Set of pending nonces stored as disjoint `[start, end)` intervals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSet {
    /// start -> end (exclusive)
    ranges: BTreeMap<Nonce, Nonce>,
    len: u64,
}

impl GapSet {
    /// Number of pending nonces
    pub fn len(&self) -> u64 {
        self.len
    }

    /// No pending nonces
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `nonce` is pending
    pub fn contains(&self, nonce: Nonce) -> bool {
        self.ranges
            .range(..=nonce)
            .next_back()
            .map_or(false, |(_, &end)| nonce < end)
    }

    /// Add `[start, end)`; must lie above every existing gap
    fn push_range(&mut self, start: Nonce, end: Nonce) {
        if start >= end {
            return;
        }
        debug_assert!(self.ranges.values().next_back().map_or(true, |&last| last <= start));

        let adjacent = self
            .ranges
            .iter_mut()
            .next_back()
            .filter(|(_, last_end)| **last_end == start);
        match adjacent {
            Some((_, last_end)) => *last_end = end,
            None => {
                self.ranges.insert(start, end);
            }
        }
        self.len += end - start;
    }

    /// Remove a single nonce; returns whether it was pending
    fn remove(&mut self, nonce: Nonce) -> bool {
        let (start, end) = match self.ranges.range(..=nonce).next_back() {
            Some((&start, &end)) if nonce < end => (start, end),
            _ => return false,
        };

        self.ranges.remove(&start);
        if start < nonce {
            self.ranges.insert(start, nonce);
        }
        if nonce + 1 < end {
            self.ranges.insert(nonce + 1, end);
        }
        self.len -= 1;
        true
    }

    /// Pending nonces in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Nonce> + '_ {
        self.ranges.iter().flat_map(|(&start, &end)| start..end)
    }

    /// Pending intervals in ascending order
    pub fn ranges(&self) -> impl Iterator<Item = (Nonce, Nonce)> + '_ {
        self.ranges.iter().map(|(&start, &end)| (start, end))
    }
}

/// How an accepted nonce was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// Nonce advanced the watermark, skipping `opened_gaps` nonces
    Frontier {
        /// Nonces newly recorded as pending
        opened_gaps: u64,
    },
    /// Nonce filled a pending gap
    GapFilled,
}

/// Exactly-once acceptance state for one lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceReconciler {
    lane: Lane,
    watermark: Nonce,
    pending_gaps: GapSet,
    #[serde(skip)]
    max_pending_gaps: Option<u64>,
}

impl NonceReconciler {
    /// Fresh reconciler expecting nonce 0
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            watermark: 0,
            pending_gaps: GapSet::default(),
            max_pending_gaps: None,
        }
    }

    /// Bound the number of pending gaps (unbounded by default)
    pub fn with_gap_limit(mut self, limit: Option<u64>) -> Self {
        self.max_pending_gaps = limit;
        self
    }

    pub(crate) fn set_gap_limit(&mut self, limit: Option<u64>) {
        self.max_pending_gaps = limit;
    }

    /// Lane this reconciler serves
    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Next nonce expected if delivery were in order
    pub fn watermark(&self) -> Nonce {
        self.watermark
    }

    /// Skipped nonces not yet delivered
    pub fn pending_gaps(&self) -> &GapSet {
        &self.pending_gaps
    }

    /// Whether `nonce` has already been accepted
    pub fn is_settled(&self, nonce: Nonce) -> bool {
        nonce < self.watermark && !self.pending_gaps.contains(nonce)
    }

    /// Validate `nonce` without changing state
    pub fn check(&self, nonce: Nonce) -> Result<Acceptance> {
        let lane = self.lane.as_str();

        if nonce >= self.watermark {
            if nonce == Nonce::MAX {
                return Err(Error::NonceExhausted { lane });
            }
            let opened_gaps = nonce - self.watermark;
            if let Some(limit) = self.max_pending_gaps {
                let requested = self.pending_gaps.len().saturating_add(opened_gaps);
                if requested > limit {
                    return Err(Error::GapLimitExceeded {
                        lane,
                        nonce,
                        requested,
                        limit,
                    });
                }
            }
            Ok(Acceptance::Frontier { opened_gaps })
        } else if self.pending_gaps.contains(nonce) {
            Ok(Acceptance::GapFilled)
        } else {
            Err(Error::DuplicateOrUnknownNonce { lane, nonce })
        }
    }

    /// Accept `nonce` at most once
    pub fn accept(&mut self, nonce: Nonce) -> Result<Acceptance> {
        let acceptance = self.check(nonce)?;

        match acceptance {
            Acceptance::Frontier { opened_gaps } => {
                self.pending_gaps.push_range(self.watermark, nonce);
                self.watermark = nonce + 1;
                tracing::debug!(
                    lane = self.lane.as_str(),
                    nonce,
                    opened_gaps,
                    watermark = self.watermark,
                    "Nonce advanced watermark"
                );
            }
            Acceptance::GapFilled => {
                self.pending_gaps.remove(nonce);
                tracing::debug!(
                    lane = self.lane.as_str(),
                    nonce,
                    pending = self.pending_gaps.len(),
                    "Nonce filled gap"
                );
            }
        }

        Ok(acceptance)
    }
}

/// Independent reconcilers for the withdraw and borrow lanes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceLanes {
    withdraw: NonceReconciler,
    borrow: NonceReconciler,
}

impl NonceLanes {
    /// Fresh lanes sharing a gap limit
    pub fn new(max_pending_gaps: Option<u64>) -> Self {
        Self {
            withdraw: NonceReconciler::new(Lane::Withdraw).with_gap_limit(max_pending_gaps),
            borrow: NonceReconciler::new(Lane::Borrow).with_gap_limit(max_pending_gaps),
        }
    }

    /// Reconciler for `lane`
    pub fn lane(&self, lane: Lane) -> &NonceReconciler {
        match lane {
            Lane::Withdraw => &self.withdraw,
            Lane::Borrow => &self.borrow,
        }
    }

    /// Mutable reconciler for `lane`
    pub fn lane_mut(&mut self, lane: Lane) -> &mut NonceReconciler {
        match lane {
            Lane::Withdraw => &mut self.withdraw,
            Lane::Borrow => &mut self.borrow,
        }
    }

    pub(crate) fn set_gap_limit(&mut self, limit: Option<u64>) {
        self.withdraw.set_gap_limit(limit);
        self.borrow.set_gap_limit(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconciler() -> NonceReconciler {
        NonceReconciler::new(Lane::Withdraw)
    }

    #[test]
    fn test_in_order_delivery() {
        let mut r = reconciler();
        for nonce in 0..5 {
            assert_eq!(r.accept(nonce).unwrap(), Acceptance::Frontier { opened_gaps: 0 });
        }
        assert_eq!(r.watermark(), 5);
        assert!(r.pending_gaps().is_empty());
    }

    #[test]
    fn test_gap_then_fill() {
        let mut r = reconciler();

        assert_eq!(r.accept(5).unwrap(), Acceptance::Frontier { opened_gaps: 5 });
        assert_eq!(r.watermark(), 6);
        assert_eq!(r.pending_gaps().iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

        for nonce in [2, 0, 1, 3, 4] {
            assert_eq!(r.accept(nonce).unwrap(), Acceptance::GapFilled);
        }
        assert_eq!(r.watermark(), 6);
        assert!(r.pending_gaps().is_empty());
    }

    #[test]
    fn test_duplicate_frontier_rejected() {
        let mut r = reconciler();
        r.accept(0).unwrap();
        assert_eq!(
            r.accept(0).unwrap_err(),
            Error::DuplicateOrUnknownNonce { lane: "withdraw", nonce: 0 }
        );
    }

    #[test]
    fn test_duplicate_gap_fill_rejected() {
        let mut r = reconciler();
        r.accept(3).unwrap();
        r.accept(1).unwrap();
        assert!(r.accept(1).unwrap_err().is_replay());
        assert!(r.is_settled(1));
        assert!(!r.is_settled(2));
        assert!(!r.is_settled(4));
    }

    #[test]
    fn test_check_does_not_mutate() {
        let r = reconciler();
        assert_eq!(r.check(9).unwrap(), Acceptance::Frontier { opened_gaps: 9 });
        assert_eq!(r.watermark(), 0);
        assert!(r.pending_gaps().is_empty());
    }

    #[test]
    fn test_large_jump_is_single_interval() {
        let mut r = reconciler();
        r.accept(1_000_000_000).unwrap();
        assert_eq!(r.pending_gaps().len(), 1_000_000_000);
        assert_eq!(r.pending_gaps().ranges().count(), 1);

        r.accept(500).unwrap();
        assert_eq!(r.pending_gaps().ranges().collect::<Vec<_>>(), vec![(0, 500), (501, 1_000_000_000)]);
        assert_eq!(r.pending_gaps().len(), 999_999_999);
    }

    #[test]
    fn test_adjacent_jumps_coalesce() {
        let mut r = reconciler();
        r.accept(2).unwrap();
        r.accept(0).unwrap();
        r.accept(1).unwrap();
        r.accept(5).unwrap();
        assert_eq!(r.pending_gaps().ranges().collect::<Vec<_>>(), vec![(3, 5)]);
        r.accept(8).unwrap();
        assert_eq!(r.pending_gaps().ranges().collect::<Vec<_>>(), vec![(3, 5), (6, 8)]);
    }

    #[test]
    fn test_max_nonce_exhausts_lane() {
        let mut r = reconciler();
        assert_eq!(r.accept(Nonce::MAX).unwrap_err(), Error::NonceExhausted { lane: "withdraw" });
        r.accept(Nonce::MAX - 1).unwrap();
        assert_eq!(r.watermark(), Nonce::MAX);
    }

    #[test]
    fn test_gap_limit_rejects_without_change() {
        let mut r = reconciler().with_gap_limit(Some(3));
        r.accept(3).unwrap();
        let err = r.accept(5).unwrap_err();
        assert_eq!(
            err,
            Error::GapLimitExceeded { lane: "withdraw", nonce: 5, requested: 4, limit: 3 }
        );
        assert_eq!(r.watermark(), 4);
        assert_eq!(r.pending_gaps().len(), 3);

        r.accept(0).unwrap();
        r.accept(5).unwrap();
        assert_eq!(r.pending_gaps().len(), 3);
    }

    #[test]
    fn test_lanes_are_independent() {
        let mut lanes = NonceLanes::new(None);
        lanes.lane_mut(Lane::Withdraw).accept(10).unwrap();
        assert_eq!(lanes.lane(Lane::Borrow).watermark(), 0);
        lanes.lane_mut(Lane::Borrow).accept(0).unwrap();
        assert_eq!(lanes.lane(Lane::Withdraw).pending_gaps().len(), 10);
        assert!(lanes.lane(Lane::Borrow).pending_gaps().is_empty());
    }

    #[test]
    fn test_serde_roundtrip_drops_limit() {
        let mut r = reconciler().with_gap_limit(Some(10));
        r.accept(4).unwrap();
        let bytes = bincode::serialize(&r).unwrap();
        let restored: NonceReconciler = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.watermark(), 5);
        assert_eq!(restored.pending_gaps(), r.pending_gaps());
        assert_eq!(restored.max_pending_gaps, None);
    }
}
