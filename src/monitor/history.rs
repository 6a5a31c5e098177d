// Fixed-capacity FIFO of bandwidth points

use crate::models::BandwidthPoint;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BandwidthHistory {
    points: VecDeque<BandwidthPoint>,
    capacity: usize,
}

impl BandwidthHistory {
    /// Capacity is clamped to at least one point.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest point when full.
    pub fn push(&mut self, point: BandwidthPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn to_vec(&self) -> Vec<BandwidthPoint> {
        self.points.iter().copied().collect()
    }
}
