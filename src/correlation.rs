//! The client-wide correlation id counter: monotonic and unique per
//! client, not per connection.

use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Default)]
pub struct CorrelationCounter(AtomicI32);

impl CorrelationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
