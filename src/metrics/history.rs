//! Rolling CPU history behind the dashboard's trend chart.

use serde::Serialize;
use std::collections::VecDeque;

/// Bounded FIFO of CPU percentages for trend display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    capacity: usize,
    cpu_percent: VecDeque<f32>,
}

impl History {
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            cpu_percent: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a value, evicting the oldest when full.
    pub fn push(&mut self, value: f32) {
        if self.cpu_percent.len() >= self.capacity {
            self.cpu_percent.pop_front();
        }
        self.cpu_percent.push_back(value);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.cpu_percent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_empty()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<f32> {
        self.cpu_percent.iter().copied().collect()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(crate::DEFAULT_HISTORY_CAPACITY)
    }
}
