//! `Channel`: the `StreamGraph` edge type (spec §3 "Channel").

use dataflow_core::type_registry::TypeId;
use serde::{Deserialize, Serialize};

/// Depth = multiplicity * this. Chosen to give the FIFO enough slack that
/// a producer several firings ahead of its consumer never stalls in the
/// steady state (spec §3, §4.4).
pub const FIFO_SIZE_MULTIPLIER: u64 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub element_type: TypeId,
    /// Elements crossing this channel per whole-graph steady-state cycle.
    /// `None` until [`crate::multiplicity::compute`] resolves it.
    pub multiplicity: Option<u64>,
}

impl Channel {
    pub fn new(element_type: TypeId) -> Self {
        Channel { element_type, multiplicity: None }
    }

    /// FIFO depth to synthesise for this channel, or `None` if multiplicity
    /// hasn't been solved yet.
    pub fn depth(&self) -> Option<u64> {
        self.multiplicity.map(|m| m * FIFO_SIZE_MULTIPLIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_multiplicity_times_fifo_multiplier() {
        let mut c = Channel::new(TypeId::INT);
        assert_eq!(c.depth(), None);
        c.multiplicity = Some(8);
        assert_eq!(c.depth(), Some(32));
    }
}
