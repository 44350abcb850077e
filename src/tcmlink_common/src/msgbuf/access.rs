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

//! Memory Access Traits for Ring Operations
//!
//! This module defines the [`MemOps`] trait that abstracts shared-memory
//! access for the ring endpoints. Host and device sit in different cache
//! domains connected by PCIe, so how an address is reached (BAR window,
//! DMA-coherent mapping, plain local memory in tests) is a backend decision;
//! the transport only dictates the ordering: ring indices are published with
//! release stores and observed with acquire loads.

use bytemuck::Pod;

/// Backend-provided memory access for the message rings.
///
/// # Safety
///
/// Implementations must ensure that:
/// - Addresses passed to methods are valid for the duration of the call
/// - Memory ordering guarantees are upheld as documented
/// - Reads and writes don't cause undefined behavior (alignment, validity)
pub trait MemOps {
    type Error;

    /// Read bytes from shared memory.
    ///
    /// Used for slot payloads and for the published-once control structures.
    ///
    /// # Returns
    ///
    /// Number of bytes actually read (should equal `dst.len()` on success).
    fn read(&self, addr: u64, dst: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write bytes to shared memory.
    ///
    /// # Returns
    ///
    /// Number of bytes actually written (should equal `src.len()` on success).
    fn write(&self, addr: u64, src: &[u8]) -> Result<usize, Self::Error>;

    /// Load a u16 ring index with acquire semantics.
    ///
    /// Used to observe the counterpart's cursor; slot contents read after
    /// this load are ordered behind the producer's publishing store.
    ///
    /// `addr` must translate to a valid, aligned 16-bit word in shared memory.
    fn load_acquire_u16(&self, addr: u64) -> Result<u16, Self::Error>;

    /// Store a u16 ring index with release semantics.
    ///
    /// Used to publish our own cursor; slot contents written before this
    /// store become visible to the other side no later than the index.
    ///
    /// `addr` must translate to a valid, aligned 16-bit word in shared memory.
    fn store_release_u16(&self, addr: u64, val: u16) -> Result<(), Self::Error>;

    /// Load a u32 mailbox word with acquire semantics.
    fn load_acquire_u32(&self, addr: u64) -> Result<u32, Self::Error>;

    /// Store a u32 mailbox word with release semantics.
    fn store_release_u32(&self, addr: u64, val: u32) -> Result<(), Self::Error>;

    /// Read a Pod type at the given address.
    ///
    /// The caller must ensure `addr` is valid, aligned, and translates to
    /// initialized memory.
    fn read_val<T: Pod>(&self, addr: u64) -> Result<T, Self::Error> {
        let mut val = T::zeroed();
        let bytes = bytemuck::bytes_of_mut(&mut val);

        self.read(addr, bytes)?;
        Ok(val)
    }

    /// Write a Pod type at the given address.
    fn write_val<T: Pod>(&self, addr: u64, val: T) -> Result<(), Self::Error> {
        let bytes = bytemuck::bytes_of(&val);
        self.write(addr, bytes)?;
        Ok(())
    }
}
