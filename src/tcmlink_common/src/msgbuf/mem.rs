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

//! Ring Descriptor Wire Types
//!
//! Bit-exact layouts of the per-ring structures the device publishes in TCM:
//! where a ring's backing buffer lives ([`RingMem`]) and where its cursors
//! currently stand ([`RingState`]). Existing firmware reads these with fixed
//! offsets, so sizes and field order are load-bearing and asserted at compile
//! time.

use thiserror::Error;

use bytemuck::{Pod, Zeroable};

use super::MemOps;

/// A ring's runtime state is live once the owning side has published a valid
/// descriptor and zeroed both cursors. There is no further lifecycle on the
/// wire; teardown invalidates the whole shared region.
pub const RING_STATE_INITED: u8 = 1;

/// Rejected ring configurations, caught by the owning side before a
/// descriptor is ever published.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ring capacity {max_item} is too small; a ring needs at least 2 slots")]
    CapacityTooSmall { max_item: u16 },
    #[error("ring slot size must be non-zero")]
    ZeroItemLen,
    #[error("{max_item} slots of {len_items} bytes do not fill the {buf_len}-byte buffer")]
    BufferLenMismatch {
        max_item: u16,
        len_items: u16,
        buf_len: u32,
    },
}

/// A 64-bit DMA address split into two 32-bit halves, low word first.
///
/// Keeps shared structures portable across 32/64-bit builds without
/// requiring 64-bit-aligned access anywhere in TCM.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
pub struct SharedAddr {
    pub low: u32,
    pub high: u32,
}

const _: () = assert!(core::mem::size_of::<SharedAddr>() == 8);
const _: () = assert!(SharedAddr::LOW_OFFSET == 0);
const _: () = assert!(SharedAddr::HIGH_OFFSET == 4);

impl SharedAddr {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub const LOW_OFFSET: usize = core::mem::offset_of!(Self, low);
    pub const HIGH_OFFSET: usize = core::mem::offset_of!(Self, high);

    #[inline]
    pub const fn from_u64(addr: u64) -> Self {
        Self {
            low: addr as u32,
            high: (addr >> 32) as u32,
        }
    }

    #[inline]
    pub const fn to_u64(self) -> u64 {
        ((self.high as u64) << 32) | self.low as u64
    }
}

impl From<u64> for SharedAddr {
    fn from(addr: u64) -> Self {
        Self::from_u64(addr)
    }
}

/// Tag distinguishing the fixed common rings from dynamically assigned
/// per-flow TX rings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RingKind {
    Common = 0,
    Flow = 1,
}

/// Placement and shape of one message ring (`ring_mem`).
///
/// Published once by the device at link bring-up, read-only afterwards.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
pub struct RingMem {
    /// Ordinal identifying which logical ring this is.
    pub idx: u16,
    /// [`RingKind`] on the wire.
    pub ring_type: u8,
    pub rsvd: u8,
    /// Ring capacity in slots, not bytes.
    pub max_item: u16,
    /// Size of each slot in bytes.
    pub len_items: u16,
    /// DMA address of the ring's backing buffer.
    pub base: SharedAddr,
}

const _: () = assert!(core::mem::size_of::<RingMem>() == 16);
const _: () = assert!(RingMem::IDX_OFFSET == 0);
const _: () = assert!(RingMem::TYPE_OFFSET == 2);
const _: () = assert!(RingMem::MAX_ITEM_OFFSET == 4);
const _: () = assert!(RingMem::LEN_ITEMS_OFFSET == 6);
const _: () = assert!(RingMem::BASE_OFFSET == 8);

impl RingMem {
    pub const SIZE: usize = core::mem::size_of::<Self>();
    pub const ALIGN: usize = core::mem::align_of::<Self>();

    pub const IDX_OFFSET: usize = core::mem::offset_of!(Self, idx);
    pub const TYPE_OFFSET: usize = core::mem::offset_of!(Self, ring_type);
    pub const MAX_ITEM_OFFSET: usize = core::mem::offset_of!(Self, max_item);
    pub const LEN_ITEMS_OFFSET: usize = core::mem::offset_of!(Self, len_items);
    pub const BASE_OFFSET: usize = core::mem::offset_of!(Self, base);

    /// Build a validated descriptor for a ring backed by `buf_len` bytes at
    /// `base`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::CapacityTooSmall`] - fewer than 2 slots; a 1-slot
    ///   ring cannot tell empty from full
    /// - [`ConfigError::ZeroItemLen`] - zero-byte slots
    /// - [`ConfigError::BufferLenMismatch`] - `max_item * len_items` does
    ///   not equal the declared buffer length
    pub fn new(
        idx: u16,
        kind: RingKind,
        max_item: u16,
        len_items: u16,
        base: u64,
        buf_len: u32,
    ) -> Result<Self, ConfigError> {
        if max_item < 2 {
            return Err(ConfigError::CapacityTooSmall { max_item });
        }
        if len_items == 0 {
            return Err(ConfigError::ZeroItemLen);
        }
        if max_item as u32 * len_items as u32 != buf_len {
            return Err(ConfigError::BufferLenMismatch {
                max_item,
                len_items,
                buf_len,
            });
        }

        Ok(Self {
            idx,
            ring_type: kind as u8,
            rsvd: 0,
            max_item,
            len_items,
            base: SharedAddr::from_u64(base),
        })
    }

    /// Total byte length of the backing buffer.
    #[inline]
    pub fn byte_len(&self) -> u32 {
        self.max_item as u32 * self.len_items as u32
    }

    #[inline]
    pub fn kind(&self) -> Option<RingKind> {
        match self.ring_type {
            0 => Some(RingKind::Common),
            1 => Some(RingKind::Flow),
            _ => None,
        }
    }

    /// Read a descriptor from the published table. Plain read: the table is
    /// immutable after bring-up.
    pub fn read_from<M: MemOps>(mem: &M, addr: u64) -> Result<Self, M::Error> {
        mem.read_val(addr)
    }

    pub fn write_to<M: MemOps>(&self, mem: &M, addr: u64) -> Result<(), M::Error> {
        mem.write_val(addr, *self)
    }
}

/// Live cursors of one message ring (`ring_state`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
pub struct RingState {
    /// Ordinal, matching the descriptor's `idx`.
    pub idx: u8,
    /// Lifecycle flag; [`RING_STATE_INITED`] once published.
    pub state: u8,
    /// Consumer cursor, slot index in `[0, max_item)`.
    pub r_offset: u16,
    /// Producer cursor, slot index in `[0, max_item)`.
    pub w_offset: u16,
    /// Auxiliary threshold marker. Carried for wire compatibility; the
    /// transport moves it on request and never interprets it.
    pub e_offset: u16,
}

const _: () = assert!(core::mem::size_of::<RingState>() == 8);
const _: () = assert!(RingState::IDX_OFFSET == 0);
const _: () = assert!(RingState::STATE_OFFSET == 1);
const _: () = assert!(RingState::R_OFFSET == 2);
const _: () = assert!(RingState::W_OFFSET == 4);
const _: () = assert!(RingState::E_OFFSET == 6);

impl RingState {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub const IDX_OFFSET: usize = core::mem::offset_of!(Self, idx);
    pub const STATE_OFFSET: usize = core::mem::offset_of!(Self, state);
    pub const R_OFFSET: usize = core::mem::offset_of!(Self, r_offset);
    pub const W_OFFSET: usize = core::mem::offset_of!(Self, w_offset);
    pub const E_OFFSET: usize = core::mem::offset_of!(Self, e_offset);

    /// Fresh state for a newly published ring: both cursors at zero.
    pub fn new_inited(idx: u8) -> Self {
        Self {
            idx,
            state: RING_STATE_INITED,
            r_offset: 0,
            w_offset: 0,
            e_offset: 0,
        }
    }

    #[inline]
    pub fn is_inited(&self) -> bool {
        self.state == RING_STATE_INITED
    }

    pub fn read_from<M: MemOps>(mem: &M, addr: u64) -> Result<Self, M::Error> {
        mem.read_val(addr)
    }

    pub fn write_to<M: MemOps>(&self, mem: &M, addr: u64) -> Result<(), M::Error> {
        mem.write_val(addr, *self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_addr_splits_low_word_first() {
        let addr = SharedAddr::from_u64(0x1234_5678_9abc_def0);
        assert_eq!(addr.low, 0x9abc_def0);
        assert_eq!(addr.high, 0x1234_5678);
        assert_eq!(addr.to_u64(), 0x1234_5678_9abc_def0);

        // low word first on the wire
        let bytes = bytemuck::bytes_of(&addr);
        assert_eq!(&bytes[..4], &0x9abc_def0u32.to_le_bytes());
        assert_eq!(&bytes[4..], &0x1234_5678u32.to_le_bytes());
    }

    #[test]
    fn ring_mem_round_trips_through_bytes() {
        let mem = RingMem::new(3, RingKind::Common, 256, 16, 0xDEAD_0000_BEEF_0000, 4096).unwrap();

        let bytes = *bytemuck::bytes_of(&mem).first_chunk::<16>().unwrap();
        let back: RingMem = bytemuck::cast(bytes);

        assert_eq!(back, mem);
        assert_eq!(back.idx, 3);
        assert_eq!(back.kind(), Some(RingKind::Common));
        assert_eq!(back.max_item, 256);
        assert_eq!(back.len_items, 16);
        assert_eq!(back.base.low, 0xBEEF_0000);
        assert_eq!(back.base.high, 0xDEAD_0000);
    }

    #[test]
    fn ring_mem_rejects_capacity_one() {
        let err = RingMem::new(5, RingKind::Flow, 1, 16, 0x1000, 16).unwrap_err();
        assert_eq!(err, ConfigError::CapacityTooSmall { max_item: 1 });

        let err = RingMem::new(5, RingKind::Flow, 0, 16, 0x1000, 0).unwrap_err();
        assert_eq!(err, ConfigError::CapacityTooSmall { max_item: 0 });
    }

    #[test]
    fn ring_mem_rejects_zero_item_len() {
        let err = RingMem::new(0, RingKind::Common, 8, 0, 0x1000, 0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroItemLen);
    }

    #[test]
    fn ring_mem_rejects_buffer_len_mismatch() {
        // buffer too small
        assert!(matches!(
            RingMem::new(0, RingKind::Common, 64, 64, 0x1000, 4095),
            Err(ConfigError::BufferLenMismatch { .. })
        ));
        // buffer too large
        assert!(matches!(
            RingMem::new(0, RingKind::Common, 64, 64, 0x1000, 8192),
            Err(ConfigError::BufferLenMismatch { .. })
        ));
        // the product is computed in u32, so the biggest rings don't wrap
        let big = RingMem::new(0, RingKind::Common, u16::MAX, u16::MAX, 0, 0xFFFE_0001).unwrap();
        assert_eq!(big.byte_len(), 0xFFFE_0001);
    }

    #[test]
    fn ring_state_starts_empty() {
        let state = RingState::new_inited(2);
        assert!(state.is_inited());
        assert_eq!(state.r_offset, 0);
        assert_eq!(state.w_offset, 0);
        assert_eq!(state.e_offset, 0);
    }

    #[test]
    fn ring_state_round_trips_through_bytes() {
        let state = RingState {
            idx: 4,
            state: RING_STATE_INITED,
            r_offset: 17,
            w_offset: 40,
            e_offset: 25,
        };
        let bytes = *bytemuck::bytes_of(&state).first_chunk::<8>().unwrap();
        let back: RingState = bytemuck::cast(bytes);
        assert_eq!(back, state);
    }

    #[test]
    fn unknown_ring_type_has_no_kind() {
        let mut mem = RingMem::new(0, RingKind::Flow, 4, 8, 0, 32).unwrap();
        assert_eq!(mem.kind(), Some(RingKind::Flow));
        mem.ring_type = 7;
        assert_eq!(mem.kind(), None);
    }
}
