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

//! Shared Control Block
//!
//! At link bring-up the device publishes a single control block
//! ([`DeviceShared`]) at a well-known location in its TCM. It is the root of
//! everything else: the host reads it once, follows [`RingInfo`] to the ring
//! descriptor table and the four cursor arrays, and from then on touches
//! only the fields it legitimately owns (its own cursors, its mailbox word).
//!
//! Addresses inside the block are *device-local* TCM offsets, never host
//! pointers. They are carried in the [`TcmOffset`] newtype so that a device
//! offset cannot be dereferenced by accident; the one place a host address
//! is produced is [`TcmWindow::resolve`], which is also where bounds are
//! enforced.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use super::flow::{
    is_d2h_common_ring, is_h2d_common_ring, FLOW_RING_BASE, H2D_COMMON_RINGS, MAX_TX_FLOWS,
};
use super::mem::SharedAddr;
use super::MemOps;

/// Control-block protocol revision this implementation speaks.
pub const SHARED_VERSION: u8 = 5;

/// Size in bytes of one cursor word in the index arrays.
pub const INDEX_WORD_SIZE: u32 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SharedError {
    #[error("Control block speaks protocol version {version}, expected {SHARED_VERSION}")]
    UnsupportedVersion { version: u8 },
    #[error("TCM range {offset:#x}+{len:#x} outside the mapped window")]
    OutsideWindow { offset: u32, len: u32 },
    #[error("Ring {id} is not a host-to-device ring")]
    NotAnH2dRing { id: u16 },
    #[error("Ring {id} is not a device-to-host ring")]
    NotAD2hRing { id: u16 },
    #[error("Control block advertises {count} flow rings, at most {MAX_TX_FLOWS} supported")]
    TooManyFlowRings { count: u16 },
    #[error("Shared memory access failed")]
    Mem,
}

/// A device-local shared-memory offset.
///
/// Distinct from a host address on purpose: the type system keeps the two
/// domains apart, and [`TcmWindow::resolve`] is the only crossing point.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
pub struct TcmOffset(u32);

impl TcmOffset {
    #[inline]
    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// A zero offset marks an absent optional region.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// The host's view of the device's TCM through a PCIe BAR mapping.
#[derive(Debug, Clone, Copy)]
pub struct TcmWindow {
    /// Device-local address where the window starts.
    pub device_base: u32,
    /// Host address the window is mapped at.
    pub host_base: u64,
    /// Window length in bytes.
    pub len: u32,
}

impl TcmWindow {
    /// Translate a device-local offset to a host address, for an access of
    /// `len` bytes.
    ///
    /// # Errors
    ///
    /// - [`SharedError::OutsideWindow`] - the range is not fully contained
    ///   in the mapped window
    pub fn resolve(&self, offset: TcmOffset, len: u32) -> Result<u64, SharedError> {
        let off = offset.get();
        let oob = off < self.device_base
            || u64::from(off - self.device_base) + u64::from(len) > u64::from(self.len);
        if oob {
            return Err(SharedError::OutsideWindow { offset: off, len });
        }
        Ok(self.host_base + u64::from(off - self.device_base))
    }
}

bitflags! {
    /// Link-health bits carried next to the version in the shared flags
    /// word. These report firmware state; they play no part in the ring
    /// index protocol.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LinkFlags: u32 {
        /// Firmware was built with asserts compiled in.
        const ASSERT_BUILT = 0x0100;
        /// An assert has fired on the device.
        const ASSERT_FIRED = 0x0200;
        /// The device has trapped.
        const TRAP_FIRED   = 0x0400;
        /// The device is sitting in a breakpoint.
        const IN_BRPT      = 0x0800;
        /// A breakpoint is armed.
        const SET_BRPT     = 0x1000;
        /// A breakpoint is pending.
        const PENDING_BRPT = 0x2000;
    }
}

/// The shared version/flags word: protocol revision in the low byte,
/// [`LinkFlags`] above it.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
pub struct SharedFlags(u32);

const _: () = assert!(core::mem::size_of::<SharedFlags>() == 4);

impl SharedFlags {
    const VERSION_MASK: u32 = 0x00FF;

    pub fn new(version: u8, flags: LinkFlags) -> Self {
        Self(version as u32 | flags.bits())
    }

    /// Protocol revision (low byte).
    #[inline]
    pub fn version(self) -> u8 {
        (self.0 & Self::VERSION_MASK) as u8
    }

    /// Link-health bits, unknown bits dropped.
    #[inline]
    pub fn link_flags(self) -> LinkFlags {
        LinkFlags::from_bits_truncate(self.0)
    }

    #[inline]
    pub fn contains(self, flags: LinkFlags) -> bool {
        self.link_flags().contains(flags)
    }

    #[inline]
    pub fn insert(&mut self, flags: LinkFlags) {
        self.0 |= flags.bits();
    }

    /// Has the firmware stopped on a trap or a fired assert?
    #[inline]
    pub fn is_halted(self) -> bool {
        self.contains(LinkFlags::TRAP_FIRED) || self.contains(LinkFlags::ASSERT_FIRED)
    }
}

/// Where every ring and cursor lives (`ring_info`).
///
/// Four cursor arrays exist, one per direction and cursor kind. The
/// device-local copies are authoritative; the `*_hostaddr` fields name host
/// DMA buffers the device mirrors indices into so the host can read them
/// without crossing the bus.
///
/// Array layout, one [`INDEX_WORD_SIZE`]-byte word per ring:
///
/// ```text
/// h2d arrays: [ control submit | rxpost submit | flow 0 | flow 1 | ... ]
/// d2h arrays: [ control complete | tx complete | rx complete ]
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
pub struct RingInfo {
    /// Ring descriptor table ([`RingMem`](super::RingMem) entries).
    pub ringmem_ptr: TcmOffset,
    /// H2D write-index array (host produces, device consumes).
    pub h2d_w_idx_ptr: TcmOffset,
    /// H2D read-index array.
    pub h2d_r_idx_ptr: TcmOffset,
    /// D2H write-index array.
    pub d2h_w_idx_ptr: TcmOffset,
    /// D2H read-index array.
    pub d2h_r_idx_ptr: TcmOffset,
    /// Host DMA shadow of the H2D write-index array.
    pub h2d_w_idx_hostaddr: SharedAddr,
    /// Host DMA shadow of the H2D read-index array.
    pub h2d_r_idx_hostaddr: SharedAddr,
    /// Host DMA shadow of the D2H write-index array.
    pub d2h_w_idx_hostaddr: SharedAddr,
    /// Host DMA shadow of the D2H read-index array.
    pub d2h_r_idx_hostaddr: SharedAddr,
    /// Number of per-flow TX sub-queues this device supports.
    pub max_sub_queues: u16,
    pub rsvd: u16,
}

const _: () = assert!(core::mem::size_of::<RingInfo>() == 56);
const _: () = assert!(core::mem::offset_of!(RingInfo, ringmem_ptr) == 0);
const _: () = assert!(core::mem::offset_of!(RingInfo, h2d_w_idx_ptr) == 4);
const _: () = assert!(core::mem::offset_of!(RingInfo, h2d_w_idx_hostaddr) == 20);
const _: () = assert!(core::mem::offset_of!(RingInfo, max_sub_queues) == 52);

impl RingInfo {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn read_from<M: MemOps>(mem: &M, addr: u64) -> Result<Self, M::Error> {
        mem.read_val(addr)
    }

    pub fn write_to<M: MemOps>(&self, mem: &M, addr: u64) -> Result<(), M::Error> {
        mem.write_val(addr, *self)
    }

    /// Reject a control block advertising more flow rings than the wire
    /// contract allows.
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.max_sub_queues > MAX_TX_FLOWS {
            return Err(SharedError::TooManyFlowRings {
                count: self.max_sub_queues,
            });
        }
        Ok(())
    }

    /// Position of an H2D ring's cursor within the H2D index arrays.
    ///
    /// Common submit rings come first, flow rings follow in ordinal order.
    pub fn h2d_index_slot(&self, ring_id: u16) -> Result<u32, SharedError> {
        if is_h2d_common_ring(ring_id) {
            return Ok(ring_id as u32);
        }
        let flow_end = FLOW_RING_BASE + self.max_sub_queues;
        if (FLOW_RING_BASE..flow_end).contains(&ring_id) {
            return Ok((H2D_COMMON_RINGS + (ring_id - FLOW_RING_BASE)) as u32);
        }
        Err(SharedError::NotAnH2dRing { id: ring_id })
    }

    /// Position of a D2H ring's cursor within the D2H index arrays.
    pub fn d2h_index_slot(&self, ring_id: u16) -> Result<u32, SharedError> {
        if is_d2h_common_ring(ring_id) {
            return Ok((ring_id - H2D_COMMON_RINGS) as u32);
        }
        Err(SharedError::NotAD2hRing { id: ring_id })
    }

    /// Device-local offset of one H2D write-index word.
    pub fn h2d_w_idx(&self, ring_id: u16) -> Result<TcmOffset, SharedError> {
        let slot = self.h2d_index_slot(ring_id)?;
        Ok(TcmOffset::new(
            self.h2d_w_idx_ptr.get() + slot * INDEX_WORD_SIZE,
        ))
    }

    /// Device-local offset of one H2D read-index word.
    pub fn h2d_r_idx(&self, ring_id: u16) -> Result<TcmOffset, SharedError> {
        let slot = self.h2d_index_slot(ring_id)?;
        Ok(TcmOffset::new(
            self.h2d_r_idx_ptr.get() + slot * INDEX_WORD_SIZE,
        ))
    }

    /// Device-local offset of one D2H write-index word.
    pub fn d2h_w_idx(&self, ring_id: u16) -> Result<TcmOffset, SharedError> {
        let slot = self.d2h_index_slot(ring_id)?;
        Ok(TcmOffset::new(
            self.d2h_w_idx_ptr.get() + slot * INDEX_WORD_SIZE,
        ))
    }

    /// Device-local offset of one D2H read-index word.
    pub fn d2h_r_idx(&self, ring_id: u16) -> Result<TcmOffset, SharedError> {
        let slot = self.d2h_index_slot(ring_id)?;
        Ok(TcmOffset::new(
            self.d2h_r_idx_ptr.get() + slot * INDEX_WORD_SIZE,
        ))
    }
}

/// The top-level control block the device publishes once at link bring-up
/// (`pciedev_shared`).
///
/// Read-only for the host apart from the cursor words and the host mailbox
/// word it is explicitly allowed to update. Always passed around as an
/// owned value; there is deliberately no process-wide instance.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq, Hash)]
pub struct DeviceShared {
    /// Version/link-health word, see [`SharedFlags`].
    pub flags: SharedFlags,
    /// Trap record, valid when [`LinkFlags::TRAP_FIRED`] is set.
    pub trap_addr: TcmOffset,
    /// Assert expression string, valid when [`LinkFlags::ASSERT_FIRED`] is set.
    pub assert_exp_addr: TcmOffset,
    /// Assert file-name string.
    pub assert_file_addr: TcmOffset,
    /// Assert line number.
    pub assert_line: u32,
    /// Firmware console descriptor.
    pub console_addr: TcmOffset,
    /// Message trace buffer.
    pub msgtrace_addr: TcmOffset,
    /// Firmware identity word.
    pub fwid: u32,
    /// Byte offset the device adds in front of every received frame.
    pub dma_rxoffset: u32,
    /// The [`RingInfo`] block.
    pub rings_info_ptr: TcmOffset,
    /// Host-to-device mailbox word.
    pub h2d_mb_data_ptr: TcmOffset,
    /// Device-to-host mailbox word.
    pub d2h_mb_data_ptr: TcmOffset,
    /// Length of the host scratch region below.
    pub host_dma_scratch_len: u32,
    /// Host DMA scratch region the device may use for bounce buffers.
    pub host_dma_scratch: SharedAddr,
}

const _: () = assert!(core::mem::size_of::<DeviceShared>() == 60);
const _: () = assert!(core::mem::offset_of!(DeviceShared, flags) == 0);
const _: () = assert!(core::mem::offset_of!(DeviceShared, rings_info_ptr) == 36);
const _: () = assert!(core::mem::offset_of!(DeviceShared, host_dma_scratch) == 52);

impl DeviceShared {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn read_from<M: MemOps>(mem: &M, addr: u64) -> Result<Self, M::Error> {
        mem.read_val(addr)
    }

    pub fn write_to<M: MemOps>(&self, mem: &M, addr: u64) -> Result<(), M::Error> {
        mem.write_val(addr, *self)
    }

    /// Check the protocol revision before trusting anything else in the
    /// block.
    pub fn validate(&self) -> Result<(), SharedError> {
        let version = self.flags.version();
        if version != SHARED_VERSION {
            return Err(SharedError::UnsupportedVersion { version });
        }
        Ok(())
    }
}
