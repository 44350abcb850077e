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

//! PCIe Message Ring Transport
//!
//! This module implements the shared-memory message buffer protocol spoken
//! between a host driver and device firmware across a PCIe link. Control and
//! data messages travel through single-producer/single-consumer circular
//! rings; an out-of-band doorbell tells the other side that a cursor moved.
//!
//! # Ring set
//!
//! Five common rings always exist, at fixed ordinals that are part of the
//! wire contract. Per-flow TX rings are assigned dynamically after them:
//!
//! ```text
//! ordinal  direction  ring
//!    0       H2D      control submit       host posts control messages
//!    1       H2D      rxpost submit        host posts empty receive buffers
//!    2       D2H      control complete     device posts control completions
//!    3       D2H      tx complete          device posts transmit completions
//!    4       D2H      rx complete          device posts received data
//!  5..44     H2D      flow rings           one TX ring per traffic flow
//! ```
//!
//! # Architecture
//!
//! The implementation is split into layers:
//!
//! - **Ring endpoints** ([`RingProducer`], [`RingConsumer`]): cursor
//!   management over a [`MemOps`] backend, with contiguous slot-run
//!   reservation and release/acquire index publication.
//!
//! - **Index arithmetic** ([`index`]): the pure wraparound math every ring
//!   shares. This is the only place a cursor ever wraps.
//!
//! - **Wire structures** ([`SharedAddr`], [`RingMem`], [`RingState`],
//!   [`RingInfo`], [`DeviceShared`]): bit-exact `#[repr(C)]` layouts of
//!   everything the two sides read from each other's memory.
//!
//! - **Out-of-band signalling** ([`MailboxSlot`], [`Doorbell`]): 32-bit
//!   mailbox bitmasks for link-state events that do not travel through the
//!   rings, and the doorbell hook the transport uses to say "cursor moved".
//!
//! # Synchronization
//!
//! Each ring has exactly one producer and exactly one consumer, on opposite
//! sides of the link. The producer writes slot payloads first and publishes
//! its write index with a release store; the consumer acquire-loads the
//! write index before touching any slot. The read index moves the same way
//! in the other direction. No locks exist anywhere on the wire; a side that
//! wants several threads posting into one ring must serialize them locally.
//!
//! # Quick start
//!
//! ```ignore
//! // Host side, after reading the device's control block from TCM:
//! let shared = DeviceShared::read_from(&mem, shared_addr)?;
//! shared.validate()?;
//! let info_addr = window.resolve(shared.rings_info_ptr, RingInfo::SIZE as u32)?;
//! let info = RingInfo::read_from(&mem, info_addr)?;
//!
//! let mut ctrl = RingProducer::attach(mem.clone(), ctrl_mem, ctrl_state, ctrl_addrs)?;
//! let run = ctrl.write_slots(1)?;
//! mem.write(run.addr, &request)?;
//! ctrl.publish(run.count)?;
//! doorbell.ring();
//! ```

pub mod access;
pub mod flow;
pub mod index;
pub mod mailbox;
pub mod mem;
pub mod ring;
pub mod shared;

pub use access::MemOps;
pub use flow::{
    FlowError, FlowRingTable, D2H_RING_CONTROL_COMPLETE, D2H_RING_RX_COMPLETE,
    D2H_RING_TX_COMPLETE, FLOW_RING_BASE, H2D_RING_CONTROL_SUBMIT, H2D_RING_RXPOST_SUBMIT,
    MAX_TX_FLOWS,
};
pub use mailbox::{DeviceMailboxData, Doorbell, HostMailboxData, MailboxSlot};
pub use mem::{ConfigError, RingKind, RingMem, RingState, SharedAddr, RING_STATE_INITED};
pub use ring::{RingAddrs, RingConsumer, RingError, RingProducer, SlotRun};
pub use shared::{DeviceShared, LinkFlags, RingInfo, SharedError, SharedFlags, TcmOffset, TcmWindow};

use thiserror::Error;

/// Errors that can occur anywhere in the message ring transport.
#[derive(Error, Debug)]
pub enum MsgbufError {
    #[error("Ring error: {0}")]
    Ring(#[from] RingError),
    #[error("Ring configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Shared control block error: {0}")]
    Shared(#[from] SharedError),
    #[error("Flow ring error: {0}")]
    Flow(#[from] FlowError),
}
