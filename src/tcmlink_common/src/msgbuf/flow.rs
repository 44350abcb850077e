/*
Copyright 2026  The TcmLink Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Ring Ordinals and Flow Ring Assignment
//!
//! The five common rings sit at fixed ordinals that both sides hard-code;
//! per-flow TX rings are created and torn down as traffic flows come and go,
//! and take contiguous ordinals immediately after the common rings. This
//! module owns those numbers and the allocator that hands flow ordinals out.

use smallvec::SmallVec;
use thiserror::Error;

/// Host posts command/control messages.
pub const H2D_RING_CONTROL_SUBMIT: u16 = 0;
/// Host posts empty receive buffers.
pub const H2D_RING_RXPOST_SUBMIT: u16 = 1;
/// Device posts command completions.
pub const D2H_RING_CONTROL_COMPLETE: u16 = 2;
/// Device posts transmit completions.
pub const D2H_RING_TX_COMPLETE: u16 = 3;
/// Device posts received-data completions.
pub const D2H_RING_RX_COMPLETE: u16 = 4;

/// Highest common ring ordinal.
pub const COMMON_RING_MAX_ID: u16 = D2H_RING_RX_COMPLETE;
/// Number of host-to-device common rings.
pub const H2D_COMMON_RINGS: u16 = 2;
/// Number of device-to-host common rings.
pub const D2H_COMMON_RINGS: u16 = 3;
/// First per-flow TX ring ordinal.
pub const FLOW_RING_BASE: u16 = COMMON_RING_MAX_ID + 1;
/// Most flow rings any link supports.
pub const MAX_TX_FLOWS: u16 = 40;

/// Is this one of the two fixed host-to-device submit rings?
#[inline]
pub const fn is_h2d_common_ring(id: u16) -> bool {
    id == H2D_RING_CONTROL_SUBMIT || id == H2D_RING_RXPOST_SUBMIT
}

/// Is this one of the three fixed device-to-host completion rings?
#[inline]
pub const fn is_d2h_common_ring(id: u16) -> bool {
    id >= D2H_RING_CONTROL_COMPLETE && id <= D2H_RING_RX_COMPLETE
}

/// Is this ordinal inside the flow ring range of a link supporting
/// `max_flows` flows?
#[inline]
pub const fn is_flow_ring(id: u16, max_flows: u16) -> bool {
    id >= FLOW_RING_BASE && id < FLOW_RING_BASE + max_flows
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FlowError {
    #[error("{count} flow rings requested, at most {MAX_TX_FLOWS} supported")]
    TooManyFlowRings { count: u16 },
    /// Every flow ordinal is in use. Transient; retry after a flow ends.
    #[error("All flow rings are assigned")]
    Exhausted,
    #[error("Ring {id} is not a flow ring on this link")]
    UnknownRing { id: u16 },
    #[error("Flow ring {id} is not currently assigned")]
    NotAssigned { id: u16 },
}

/// Allocator for per-flow TX ring ordinals.
///
/// Ordinals are handed out lowest-first and recycled LIFO, so a link that
/// only ever runs a few flows keeps using the same few rings.
#[derive(Debug)]
pub struct FlowRingTable {
    /// Free ordinals, lowest at the top of the stack.
    free: SmallVec<[u16; MAX_TX_FLOWS as usize]>,
    /// Bit per flow slot, set while assigned.
    live: u64,
    max_flows: u16,
}

impl FlowRingTable {
    /// Build a table for a link supporting `max_flows` flow rings (may be
    /// zero; flow rings are optional).
    pub fn new(max_flows: u16) -> Result<Self, FlowError> {
        if max_flows > MAX_TX_FLOWS {
            return Err(FlowError::TooManyFlowRings { count: max_flows });
        }

        let free = (FLOW_RING_BASE..FLOW_RING_BASE + max_flows)
            .rev()
            .collect();

        Ok(Self {
            free,
            live: 0,
            max_flows,
        })
    }

    /// Assign the lowest free flow ordinal.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(err(Debug), skip_all, level = "Trace")
    )]
    pub fn assign(&mut self) -> Result<u16, FlowError> {
        let id = self.free.pop().ok_or(FlowError::Exhausted)?;
        self.live |= 1 << (id - FLOW_RING_BASE);
        Ok(id)
    }

    /// Return a flow ordinal after its flow ends.
    pub fn release(&mut self, id: u16) -> Result<(), FlowError> {
        if !is_flow_ring(id, self.max_flows) {
            return Err(FlowError::UnknownRing { id });
        }

        let bit = 1u64 << (id - FLOW_RING_BASE);
        if self.live & bit == 0 {
            return Err(FlowError::NotAssigned { id });
        }

        self.live &= !bit;
        self.free.push(id);
        Ok(())
    }

    /// Is this ordinal currently assigned to a flow?
    pub fn is_live(&self, id: u16) -> bool {
        is_flow_ring(id, self.max_flows) && self.live & (1 << (id - FLOW_RING_BASE)) != 0
    }

    /// Number of currently assigned flow rings.
    pub fn live_count(&self) -> u16 {
        self.live.count_ones() as u16
    }

    /// Number of flow rings this link supports.
    pub fn max_flows(&self) -> u16 {
        self.max_flows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_ring_split_matches_wire_contract() {
        assert!(is_h2d_common_ring(H2D_RING_CONTROL_SUBMIT));
        assert!(is_h2d_common_ring(H2D_RING_RXPOST_SUBMIT));
        assert!(!is_h2d_common_ring(D2H_RING_CONTROL_COMPLETE));

        assert!(is_d2h_common_ring(D2H_RING_CONTROL_COMPLETE));
        assert!(is_d2h_common_ring(D2H_RING_TX_COMPLETE));
        assert!(is_d2h_common_ring(D2H_RING_RX_COMPLETE));
        assert!(!is_d2h_common_ring(FLOW_RING_BASE));

        // 2 + 3 common rings, flow rings directly after
        assert_eq!(H2D_COMMON_RINGS + D2H_COMMON_RINGS, 5);
        assert_eq!(FLOW_RING_BASE, 5);
    }

    #[test]
    fn assigns_contiguous_ordinals_from_the_base() {
        let mut table = FlowRingTable::new(4).unwrap();

        assert_eq!(table.assign().unwrap(), 5);
        assert_eq!(table.assign().unwrap(), 6);
        assert_eq!(table.assign().unwrap(), 7);
        assert_eq!(table.assign().unwrap(), 8);
        assert_eq!(table.live_count(), 4);
        assert_eq!(table.assign().unwrap_err(), FlowError::Exhausted);
    }

    #[test]
    fn released_ordinals_are_reused() {
        let mut table = FlowRingTable::new(2).unwrap();

        let a = table.assign().unwrap();
        let b = table.assign().unwrap();
        assert!(table.is_live(a) && table.is_live(b));

        table.release(a).unwrap();
        assert!(!table.is_live(a));
        assert_eq!(table.assign().unwrap(), a);
    }

    #[test]
    fn release_rejects_unknown_and_idle_rings() {
        let mut table = FlowRingTable::new(2).unwrap();

        assert_eq!(
            table.release(H2D_RING_CONTROL_SUBMIT).unwrap_err(),
            FlowError::UnknownRing { id: 0 }
        );
        assert_eq!(
            table.release(FLOW_RING_BASE + 2).unwrap_err(),
            FlowError::UnknownRing {
                id: FLOW_RING_BASE + 2
            }
        );
        assert_eq!(
            table.release(FLOW_RING_BASE).unwrap_err(),
            FlowError::NotAssigned { id: FLOW_RING_BASE }
        );

        let id = table.assign().unwrap();
        table.release(id).unwrap();
        assert_eq!(
            table.release(id).unwrap_err(),
            FlowError::NotAssigned { id }
        );
    }

    #[test]
    fn zero_flow_links_are_valid() {
        let mut table = FlowRingTable::new(0).unwrap();
        assert_eq!(table.assign().unwrap_err(), FlowError::Exhausted);
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn table_caps_at_forty_flows() {
        assert!(FlowRingTable::new(MAX_TX_FLOWS).is_ok());
        assert_eq!(
            FlowRingTable::new(MAX_TX_FLOWS + 1).unwrap_err(),
            FlowError::TooManyFlowRings {
                count: MAX_TX_FLOWS + 1
            }
        );

        // the full table really hands out all forty
        let mut table = FlowRingTable::new(MAX_TX_FLOWS).unwrap();
        for expect in FLOW_RING_BASE..FLOW_RING_BASE + MAX_TX_FLOWS {
            assert_eq!(table.assign().unwrap(), expect);
        }
        assert_eq!(table.assign().unwrap_err(), FlowError::Exhausted);
    }
}
