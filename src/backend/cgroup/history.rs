use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;

use crate::backend::ContainerStats;

/// Bounded per-container sample history, shared between concurrent backend queries.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    samples: DashMap<String, VecDeque<ContainerStats>>,
}

impl History {
    /// Creates a history keeping at most `capacity` samples per container (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: DashMap::new(),
        }
    }

    /// Returns a copy of the most recent sample of `name`.
    pub fn latest(&self, name: &str) -> Option<ContainerStats> {
        self.samples.get(name)?.back().cloned()
    }

    /// Appends a sample, evicting the oldest one once the history is full.
    pub fn record(&self, name: &str, stats: ContainerStats) {
        let mut ring = self
            .samples
            .entry(name.to_owned())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(stats);
    }

    /// Returns up to `count` most recent samples of `name`, oldest first.
    pub fn recent(&self, name: &str, count: usize) -> Vec<ContainerStats> {
        self.samples
            .get(name)
            .map(|ring| {
                let skip = ring.len().saturating_sub(count);
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Drops the history of every container not in `live`.
    pub fn retain(&self, live: &HashSet<String>) {
        self.samples.retain(|name, _| {
            let keep = live.contains(name);
            if !keep {
                log::debug!("Dropping history of vanished container `{name}`");
            }
            keep
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
