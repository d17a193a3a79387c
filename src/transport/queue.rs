use std::collections::VecDeque;

use tracing::warn;

use crate::audio::segmenter::Segment;

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued segment to make room (default)
    DropOldest,
    /// Refuse the incoming segment
    DropNewest,
    /// Hand the segment back so the producer can wait for room
    Block,
}

/// Outcome of offering a segment to the queue.
#[derive(Debug)]
pub enum Offer {
    Accepted,
    /// The oldest segment was evicted; its sequence number stays
    /// missing downstream, so the loss is visible.
    Evicted { seq: u64 },
    /// The new segment was refused and dropped.
    Refused { seq: u64 },
    /// Block policy: the queue is full and the segment is returned
    /// unconsumed; retry after pop() has made room.
    MustWait(Segment),
}

/// Bounded buffer between segment production and transport. Segments
/// queue rather than disappearing when the uploader falls behind; the
/// overflow policy is explicit configuration and every drop is logged
/// and counted.
pub struct SegmentQueue {
    items: VecDeque<Segment>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: u64,
}

impl SegmentQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            policy,
            dropped: 0,
        }
    }

    pub fn offer(&mut self, segment: Segment) -> Offer {
        if self.items.len() < self.capacity {
            self.items.push_back(segment);
            return Offer::Accepted;
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                // capacity >= 1, so the front exists here
                let evicted = self.items.pop_front().map(|s| s.seq).unwrap_or_default();
                self.dropped += 1;
                warn!(seq = evicted, "segment queue full, dropped oldest segment");
                self.items.push_back(segment);
                Offer::Evicted { seq: evicted }
            }
            OverflowPolicy::DropNewest => {
                self.dropped += 1;
                warn!(seq = segment.seq, "segment queue full, refused segment");
                Offer::Refused { seq: segment.seq }
            }
            OverflowPolicy::Block => Offer::MustWait(segment),
        }
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Segments lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(seq: u64) -> Segment {
        Segment {
            seq,
            sample_rate: 48_000,
            duration_seconds: 2.0,
            pcm: vec![0; 4],
        }
    }

    #[test]
    fn drop_oldest_evicts_and_counts() {
        let mut queue = SegmentQueue::new(2, OverflowPolicy::DropOldest);
        assert!(matches!(queue.offer(segment(0)), Offer::Accepted));
        assert!(matches!(queue.offer(segment(1)), Offer::Accepted));
        assert!(matches!(queue.offer(segment(2)), Offer::Evicted { seq: 0 }));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop().unwrap().seq, 1);
        assert_eq!(queue.pop().unwrap().seq, 2);
    }

    #[test]
    fn drop_newest_refuses_incoming() {
        let mut queue = SegmentQueue::new(1, OverflowPolicy::DropNewest);
        assert!(matches!(queue.offer(segment(0)), Offer::Accepted));
        assert!(matches!(queue.offer(segment(1)), Offer::Refused { seq: 1 }));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop().unwrap().seq, 0);
    }

    #[test]
    fn block_policy_returns_segment_unconsumed() {
        let mut queue = SegmentQueue::new(1, OverflowPolicy::Block);
        assert!(matches!(queue.offer(segment(0)), Offer::Accepted));
        let returned = match queue.offer(segment(1)) {
            Offer::MustWait(seg) => seg,
            other => panic!("expected MustWait, got {other:?}"),
        };
        assert_eq!(returned.seq, 1);
        assert_eq!(queue.dropped(), 0);
        queue.pop();
        assert!(matches!(queue.offer(returned), Offer::Accepted));
    }
}
