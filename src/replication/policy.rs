//! Eviction policies for replicas that keep failing delivery.

/// Decides whether a replica is dropped from the registry after a failed
/// write.
pub trait EvictionPolicy: Send + Sync {
    /// Called after each failed delivery with the number of failures in a
    /// row, including this one.
    fn should_evict(&self, consecutive_failures: u32) -> bool;

    fn name(&self) -> &'static str;
}

/// Keep failing replicas forever; every later change is attempted again.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn should_evict(&self, _consecutive_failures: u32) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

/// Drop a replica once it has failed this many deliveries in a row.
#[derive(Debug, Clone, Copy)]
pub struct EvictAfter(pub u32);

impl EvictionPolicy for EvictAfter {
    fn should_evict(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.0
    }

    fn name(&self) -> &'static str {
        "evict-after"
    }
}

/// Build the policy for an optional failure threshold.
pub fn from_threshold(max_consecutive_failures: Option<u32>) -> Box<dyn EvictionPolicy> {
    match max_consecutive_failures {
        Some(limit) => Box::new(EvictAfter(limit)),
        None => Box::new(NeverEvict),
    }
}
