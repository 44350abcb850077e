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

//! Out-of-band Mailbox Signalling
//!
//! Short link-state notifications (power transitions, firmware halt) do not
//! travel through the message rings. Each side owns one 32-bit mailbox word
//! in shared memory: it ORs its events in, rings the doorbell, and the other
//! side collects and clears the word. The bit assignments are part of the
//! wire contract.
//!
//! How the doorbell reaches the other side (MMIO write, MSI, eventfd in a
//! simulated link) is the collaborator's business; the transport only says
//! when to ring it.

use bitflags::bitflags;

use super::MemOps;

bitflags! {
    /// Events the host posts into its mailbox word.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HostMailboxData: u32 {
        /// Host is about to enter D3; the device must quiesce DMA.
        const D3_INFORM = 0x0000_0001;
        /// Host acknowledges the device's deep-sleep request.
        const DS_ACK    = 0x0000_0002;
        /// Host asks the firmware console to poll for input.
        const CONS_INT  = 0x8000_0000;
    }
}

bitflags! {
    /// Events the device posts into its mailbox word.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DeviceMailboxData: u32 {
        /// Device acknowledges the host's D3 entry.
        const D3_ACK       = 0x0000_0001;
        /// Device requests permission to enter deep sleep.
        const DS_ENTER_REQ = 0x0000_0002;
        /// Device has left deep sleep.
        const DS_EXIT_NOTE = 0x0000_0004;
        /// Firmware has halted; the link is dead until reset.
        const FW_HALT      = 0x1000_0000;
    }
}

/// The out-of-band "new activity" signal.
///
/// Implementations ring an interrupt, poke a doorbell register, or wake a
/// task; the transport never rings on its own, the caller decides after
/// publishing.
pub trait Doorbell {
    fn ring(&self);
}

/// One side's 32-bit mailbox word in shared memory.
///
/// Single-writer like everything else on this link: only the owning side
/// posts, only the other side collects.
#[derive(Debug, Clone, Copy)]
pub struct MailboxSlot {
    addr: u64,
}

impl MailboxSlot {
    pub const fn new(addr: u64) -> Self {
        Self { addr }
    }

    pub const fn addr(&self) -> u64 {
        self.addr
    }

    /// Post events: OR the bits into the word and publish with a release
    /// store, so a collector that saw the doorbell also sees the bits.
    pub fn post<M: MemOps>(&self, mem: &M, bits: u32) -> Result<(), M::Error> {
        let current = mem.load_acquire_u32(self.addr)?;
        mem.store_release_u32(self.addr, current | bits)
    }

    /// Post events and ring the doorbell in one step.
    pub fn post_and_ring<M: MemOps, D: Doorbell>(
        &self,
        mem: &M,
        bits: u32,
        doorbell: &D,
    ) -> Result<(), M::Error> {
        self.post(mem, bits)?;
        doorbell.ring();
        Ok(())
    }

    /// Collect and clear pending events. Returns the raw bits; zero means a
    /// spurious doorbell, which is legal and ignored.
    pub fn collect<M: MemOps>(&self, mem: &M) -> Result<u32, M::Error> {
        let bits = mem.load_acquire_u32(self.addr)?;
        if bits != 0 {
            mem.store_release_u32(self.addr, 0)?;
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::super::ring::tests::TestMem;
    use super::*;

    struct CountingBell {
        rings: Cell<u32>,
    }

    impl Doorbell for CountingBell {
        fn ring(&self) {
            self.rings.set(self.rings.get() + 1);
        }
    }

    fn mailbox() -> (Rc<TestMem>, MailboxSlot) {
        let mem = Rc::new(TestMem::new(16));
        let addr = (mem.base_addr() + 3) & !3;
        (mem, MailboxSlot::new(addr))
    }

    #[test]
    fn post_accumulates_until_collected() {
        let (mem, slot) = mailbox();

        slot.post(&mem, HostMailboxData::D3_INFORM.bits()).unwrap();
        slot.post(&mem, HostMailboxData::DS_ACK.bits()).unwrap();

        let bits = HostMailboxData::from_bits_truncate(slot.collect(&mem).unwrap());
        assert_eq!(bits, HostMailboxData::D3_INFORM | HostMailboxData::DS_ACK);

        // collecting clears the word
        assert_eq!(slot.collect(&mem).unwrap(), 0);
    }

    #[test]
    fn spurious_doorbell_reads_as_zero() {
        let (mem, slot) = mailbox();
        assert_eq!(slot.collect(&mem).unwrap(), 0);
    }

    #[test]
    fn post_and_ring_rings_once_per_post() {
        let (mem, slot) = mailbox();
        let bell = CountingBell { rings: Cell::new(0) };

        slot.post_and_ring(&mem, DeviceMailboxData::DS_ENTER_REQ.bits(), &bell)
            .unwrap();
        slot.post_and_ring(&mem, DeviceMailboxData::FW_HALT.bits(), &bell)
            .unwrap();

        assert_eq!(bell.rings.get(), 2);
        let bits = DeviceMailboxData::from_bits_truncate(slot.collect(&mem).unwrap());
        assert!(bits.contains(DeviceMailboxData::DS_ENTER_REQ));
        assert!(bits.contains(DeviceMailboxData::FW_HALT));
    }

    #[test]
    fn mailbox_words_are_independent_per_direction() {
        let mem = Rc::new(TestMem::new(24));
        let base = (mem.base_addr() + 3) & !3;
        let h2d = MailboxSlot::new(base);
        let d2h = MailboxSlot::new(base + 4);

        h2d.post(&mem, HostMailboxData::D3_INFORM.bits()).unwrap();
        d2h.post(&mem, DeviceMailboxData::D3_ACK.bits()).unwrap();

        assert_eq!(
            h2d.collect(&mem).unwrap(),
            HostMailboxData::D3_INFORM.bits()
        );
        assert_eq!(d2h.collect(&mem).unwrap(), DeviceMailboxData::D3_ACK.bits());
    }
}
