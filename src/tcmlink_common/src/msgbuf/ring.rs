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

//! Message Ring Endpoints
//!
//! Producer and consumer views of one message ring. The two endpoints live
//! on opposite sides of the PCIe link and share nothing but the slot buffer
//! and two index words:
//!
//! ```text
//!            producer side                      consumer side
//!        ┌────────────────────┐            ┌────────────────────┐
//!        │ local write cursor │            │ local read cursor  │
//!        └─────────┬──────────┘            └─────────┬──────────┘
//!                  │ store-release                   │ store-release
//!                  v                                 v
//!        ╔════════ w index word ═══ shared ═══ r index word ════╗
//!        ║              [ slot | slot | slot | ... ]            ║
//!        ╚══════════════════════════════════════════════════════╝
//!                  ^                                 ^
//!                  │ load-acquire of r               │ load-acquire of w
//! ```
//!
//! A producer fills slot payloads first and publishes the write index last;
//! a consumer observes the write index first and reads payloads after. That
//! ordering is the transport's only synchronization primitive.
//!
//! # Slot runs
//!
//! Because the backing buffer is flat, multi-slot copies must not run past
//! the buffer end. [`RingProducer::write_slots`] therefore hands out a
//! *contiguous* run, shortened at the wrap point or at the consumer's
//! cursor; a caller that wants more keeps asking and splits its batch into
//! at most two copies. [`RingProducer::try_reserve_exact`] is the strict
//! variant that refuses instead of shortening.
//!
//! # Failure model
//!
//! Ring full and ring empty surface as [`RingError::WouldBlock`]; they are
//! ordinary transient states and the caller owns the backpressure policy.
//! An index observed outside `[0, capacity)` is a protocol violation: it is
//! reported (never wrapped, never clamped) and the link supervisor is
//! expected to reset the link.

use thiserror::Error;

use super::mem::{RingMem, RingState};
use super::{index, MemOps};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RingError {
    /// Ring full (producer) or empty (consumer). Transient, not a fault.
    #[error("Operation would block")]
    WouldBlock,
    /// Ring operated on before its state reached inited.
    #[error("Ring {idx} is not initialized")]
    NotInitialized { idx: u16 },
    /// Descriptor and runtime state disagree about which ring this is.
    #[error("Ring id mismatch: descriptor {mem_idx}, state {state_idx}")]
    IdMismatch { mem_idx: u16, state_idx: u8 },
    /// Descriptor fails the capacity/slot-size invariants.
    #[error("Ring {idx} has an invalid descriptor")]
    BadDescriptor { idx: u16 },
    /// A cursor outside `[0, capacity)`. Fatal to the link.
    #[error("Index {index} outside ring of {capacity} slots")]
    IndexOutOfRange { index: u16, capacity: u16 },
    /// Producer tried to publish past the consumer, which would make the
    /// ring read as empty while full.
    #[error("Publish of {count} slots exceeds {available} available")]
    PublishOverrun { count: u16, available: u16 },
    /// Consumer tried to consume more than was ever produced.
    #[error("Consume of {count} slots exceeds {active} active")]
    ConsumeOverrun { count: u16, active: u16 },
    /// Backend memory error.
    #[error("Shared memory access failed")]
    Mem,
}

/// Resolved shared-memory addresses for one ring: where the slots live and
/// where each cursor is published. Produced by the link bring-up code from
/// [`RingInfo`](super::RingInfo) via the domain's address translation.
#[derive(Debug, Clone, Copy)]
pub struct RingAddrs {
    /// Base of the slot buffer.
    pub slot_base: u64,
    /// The 16-bit write index word.
    pub w_idx_addr: u64,
    /// The 16-bit read index word.
    pub r_idx_addr: u64,
    /// The 16-bit event offset word.
    pub e_idx_addr: u64,
}

/// A contiguous run of slots handed to the caller for reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRun {
    /// First slot index of the run.
    pub first: u16,
    /// Number of slots in the run.
    pub count: u16,
    /// Shared-memory address of the first slot.
    pub addr: u64,
    /// Byte length of the run (`count * len_items`).
    pub byte_len: u32,
}

fn validate_attach(desc: &RingMem, state: &RingState) -> Result<(), RingError> {
    if desc.max_item < 2 || desc.len_items == 0 {
        return Err(RingError::BadDescriptor { idx: desc.idx });
    }
    if desc.idx != state.idx as u16 {
        return Err(RingError::IdMismatch {
            mem_idx: desc.idx,
            state_idx: state.idx,
        });
    }
    if !state.is_inited() {
        return Err(RingError::NotInitialized { idx: desc.idx });
    }
    for cursor in [state.r_offset, state.w_offset] {
        if cursor >= desc.max_item {
            return Err(RingError::IndexOutOfRange {
                index: cursor,
                capacity: desc.max_item,
            });
        }
    }
    Ok(())
}

/// Producer endpoint of one message ring.
///
/// Exactly one of these may exist per ring, on the side that posts into it
/// (the host for submit and flow rings, the device for completion rings).
/// All mutators take `&mut self`; a side that shares one ring between
/// threads must serialize access around the endpoint itself.
#[derive(Debug)]
pub struct RingProducer<M> {
    /// Memory accessor
    mem: M,
    /// Validated ring descriptor
    desc: RingMem,
    /// Resolved cursor/slot addresses
    addrs: RingAddrs,
    /// Local write cursor; the index word lags it until `publish`
    wr: u16,
    /// Last observed consumer cursor
    rd_shadow: u16,
}

impl<M: MemOps> RingProducer<M> {
    /// Attach to a ring using the published descriptor and a snapshot of its
    /// runtime state.
    ///
    /// # Errors
    ///
    /// - [`RingError::BadDescriptor`] - capacity or slot-size invariant broken
    /// - [`RingError::IdMismatch`] - descriptor and state name different rings
    /// - [`RingError::NotInitialized`] - ring not yet published
    /// - [`RingError::IndexOutOfRange`] - a snapshot cursor is out of bounds
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(err(Debug), skip_all, level = "Trace")
    )]
    pub fn attach(mem: M, desc: RingMem, state: RingState, addrs: RingAddrs) -> Result<Self, RingError> {
        validate_attach(&desc, &state)?;

        Ok(Self {
            mem,
            desc,
            addrs,
            wr: state.w_offset,
            rd_shadow: state.r_offset,
        })
    }

    /// Re-read the consumer's cursor with acquire semantics and bounds-check
    /// it before any arithmetic sees it.
    fn refresh_read(&mut self) -> Result<u16, RingError> {
        let rd = self
            .mem
            .load_acquire_u16(self.addrs.r_idx_addr)
            .map_err(|_| RingError::Mem)?;

        if rd >= self.desc.max_item {
            log::error!(
                "ring {}: consumer read index {} outside [0, {})",
                self.desc.idx,
                rd,
                self.desc.max_item
            );
            return Err(RingError::IndexOutOfRange {
                index: rd,
                capacity: self.desc.max_item,
            });
        }

        self.rd_shadow = rd;
        Ok(rd)
    }

    /// Total free slots, net of the reserved empty/full disambiguation slot.
    pub fn available(&mut self) -> Result<u16, RingError> {
        let rd = self.refresh_read()?;
        Ok(index::available_to_write(rd, self.wr, self.desc.max_item))
    }

    /// Check if the ring is full (no free slots).
    pub fn is_full(&mut self) -> Result<bool, RingError> {
        Ok(self.available()? == 0)
    }

    /// Reserve up to `wanted` slots as one contiguous run starting at the
    /// write cursor.
    ///
    /// The run is shortened by the buffer end and by the consumer's cursor;
    /// fill the returned slots through [`mem`](Self::mem), then make them
    /// visible with [`publish`](Self::publish).
    ///
    /// # Errors
    ///
    /// - [`RingError::WouldBlock`] - no writable slot at all
    pub fn write_slots(&mut self, wanted: u16) -> Result<SlotRun, RingError> {
        let rd = self.refresh_read()?;
        let capacity = self.desc.max_item;

        let available = index::available_to_write(rd, self.wr, capacity);
        let contiguous = index::contiguous_write_space(rd, self.wr, capacity);
        let count = wanted.min(available).min(contiguous);

        if count == 0 {
            return Err(RingError::WouldBlock);
        }

        Ok(self.run_at(self.wr, count))
    }

    /// Reserve exactly `wanted` contiguous slots, or nothing.
    ///
    /// Refuses when either the total free count or the contiguous run before
    /// the wrap point is too short; a multi-slot copy must never spill past
    /// the buffer end.
    pub fn try_reserve_exact(&mut self, wanted: u16) -> Result<SlotRun, RingError> {
        let rd = self.refresh_read()?;
        let capacity = self.desc.max_item;

        if wanted == 0
            || index::available_to_write(rd, self.wr, capacity) < wanted
            || index::contiguous_write_space(rd, self.wr, capacity) < wanted
        {
            return Err(RingError::WouldBlock);
        }

        Ok(self.run_at(self.wr, wanted))
    }

    /// Advance the write cursor over `count` filled slots and publish it
    /// with a release store.
    ///
    /// Slot payloads written before this call are visible to the consumer no
    /// later than the new index. Returns the published index.
    ///
    /// # Errors
    ///
    /// - [`RingError::PublishOverrun`] - `count` exceeds the space the last
    ///   reservation saw; the forbidden advance onto the read cursor is
    ///   refused, since it would make the full ring read as empty
    pub fn publish(&mut self, count: u16) -> Result<u16, RingError> {
        if count == 0 {
            return Ok(self.wr);
        }

        // Checked against the last observed read index; the consumer only
        // ever grows the available count, so the check is conservative.
        let available = index::available_to_write(self.rd_shadow, self.wr, self.desc.max_item);
        if count > available {
            return Err(RingError::PublishOverrun { count, available });
        }

        let mut wr = self.wr;
        for _ in 0..count {
            wr = index::advance(wr, self.desc.max_item);
        }

        self.mem
            .store_release_u16(self.addrs.w_idx_addr, wr)
            .map_err(|_| RingError::Mem)?;
        self.wr = wr;

        Ok(wr)
    }

    /// Current (local) write cursor.
    #[inline]
    pub fn write_index(&self) -> u16 {
        self.wr
    }

    /// Ring capacity in slots.
    #[inline]
    pub fn capacity(&self) -> u16 {
        self.desc.max_item
    }

    /// Slot size in bytes.
    #[inline]
    pub fn item_len(&self) -> u16 {
        self.desc.len_items
    }

    /// Ring ordinal.
    #[inline]
    pub fn ring_id(&self) -> u16 {
        self.desc.idx
    }

    /// Get memory accessor reference
    pub fn mem(&self) -> &M {
        &self.mem
    }

    /// Read the auxiliary event offset. Plain load; the field carries no
    /// synchronization role in this transport.
    pub fn event_offset(&self) -> Result<u16, RingError> {
        self.mem
            .read_val(self.addrs.e_idx_addr)
            .map_err(|_| RingError::Mem)
    }

    /// Move the auxiliary event offset. Opaque to the transport.
    pub fn set_event_offset(&self, offset: u16) -> Result<(), RingError> {
        self.mem
            .write_val(self.addrs.e_idx_addr, offset)
            .map_err(|_| RingError::Mem)
    }

    fn run_at(&self, first: u16, count: u16) -> SlotRun {
        let item = self.desc.len_items as u64;
        SlotRun {
            first,
            count,
            addr: self.addrs.slot_base + first as u64 * item,
            byte_len: count as u32 * self.desc.len_items as u32,
        }
    }
}

/// Consumer endpoint of one message ring.
///
/// The mirror of [`RingProducer`]: observes the write index with acquire
/// loads, hands out contiguous readable runs, and publishes the read index
/// after the slots have been drained so the producer can reuse them.
#[derive(Debug)]
pub struct RingConsumer<M> {
    /// Memory accessor
    mem: M,
    /// Validated ring descriptor
    desc: RingMem,
    /// Resolved cursor/slot addresses
    addrs: RingAddrs,
    /// Local read cursor; the index word lags it until `consume`
    rd: u16,
    /// Last observed producer cursor
    wr_shadow: u16,
}

impl<M: MemOps> RingConsumer<M> {
    /// Attach to a ring using the published descriptor and a snapshot of its
    /// runtime state. Validation is identical to [`RingProducer::attach`].
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(err(Debug), skip_all, level = "Trace")
    )]
    pub fn attach(mem: M, desc: RingMem, state: RingState, addrs: RingAddrs) -> Result<Self, RingError> {
        validate_attach(&desc, &state)?;

        Ok(Self {
            mem,
            desc,
            addrs,
            rd: state.r_offset,
            wr_shadow: state.w_offset,
        })
    }

    fn refresh_write(&mut self) -> Result<u16, RingError> {
        let wr = self
            .mem
            .load_acquire_u16(self.addrs.w_idx_addr)
            .map_err(|_| RingError::Mem)?;

        if wr >= self.desc.max_item {
            log::error!(
                "ring {}: producer write index {} outside [0, {})",
                self.desc.idx,
                wr,
                self.desc.max_item
            );
            return Err(RingError::IndexOutOfRange {
                index: wr,
                capacity: self.desc.max_item,
            });
        }

        self.wr_shadow = wr;
        Ok(wr)
    }

    /// Number of produced-but-unconsumed items.
    pub fn active(&mut self) -> Result<u16, RingError> {
        let wr = self.refresh_write()?;
        Ok(index::active_count(self.rd, wr, self.desc.max_item))
    }

    /// Check if the ring has nothing to read.
    pub fn is_empty(&mut self) -> Result<bool, RingError> {
        Ok(self.active()? == 0)
    }

    /// Fetch up to `max` readable slots as one contiguous run starting at
    /// the read cursor. Payload reads are ordered behind the producer's
    /// publishing store by the acquire load inside.
    ///
    /// # Errors
    ///
    /// - [`RingError::WouldBlock`] - nothing to read
    pub fn read_slots(&mut self, max: u16) -> Result<SlotRun, RingError> {
        let wr = self.refresh_write()?;
        let capacity = self.desc.max_item;

        let contiguous = index::contiguous_read_space(self.rd, wr, capacity);
        let count = max.min(contiguous);

        if count == 0 {
            return Err(RingError::WouldBlock);
        }

        let item = self.desc.len_items as u64;
        Ok(SlotRun {
            first: self.rd,
            count,
            addr: self.addrs.slot_base + self.rd as u64 * item,
            byte_len: count as u32 * self.desc.len_items as u32,
        })
    }

    /// Advance the read cursor over `count` drained slots and publish it
    /// with a release store, returning the slots to the producer.
    ///
    /// # Errors
    ///
    /// - [`RingError::ConsumeOverrun`] - `count` exceeds what the last
    ///   observation saw as active
    pub fn consume(&mut self, count: u16) -> Result<u16, RingError> {
        if count == 0 {
            return Ok(self.rd);
        }

        let active = index::active_count(self.rd, self.wr_shadow, self.desc.max_item);
        if count > active {
            return Err(RingError::ConsumeOverrun { count, active });
        }

        let mut rd = self.rd;
        for _ in 0..count {
            rd = index::advance(rd, self.desc.max_item);
        }

        self.mem
            .store_release_u16(self.addrs.r_idx_addr, rd)
            .map_err(|_| RingError::Mem)?;
        self.rd = rd;

        Ok(rd)
    }

    /// Current (local) read cursor.
    #[inline]
    pub fn read_index(&self) -> u16 {
        self.rd
    }

    /// Ring capacity in slots.
    #[inline]
    pub fn capacity(&self) -> u16 {
        self.desc.max_item
    }

    /// Slot size in bytes.
    #[inline]
    pub fn item_len(&self) -> u16 {
        self.desc.len_items
    }

    /// Ring ordinal.
    #[inline]
    pub fn ring_id(&self) -> u16 {
        self.desc.idx
    }

    /// Get memory accessor reference
    pub fn mem(&self) -> &M {
        &self.mem
    }

    /// Read the auxiliary event offset. Opaque to the transport.
    pub fn event_offset(&self) -> Result<u16, RingError> {
        self.mem
            .read_val(self.addrs.e_idx_addr)
            .map_err(|_| RingError::Mem)
    }

    /// Move the auxiliary event offset. Opaque to the transport.
    pub fn set_event_offset(&self, offset: u16) -> Result<(), RingError> {
        self.mem
            .write_val(self.addrs.e_idx_addr, offset)
            .map_err(|_| RingError::Mem)
    }
}
