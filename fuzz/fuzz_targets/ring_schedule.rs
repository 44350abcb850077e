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

#![no_main]

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tcmlink_common::msgbuf::mem::{RingKind, RingMem, RingState};
use tcmlink_common::msgbuf::ring::{RingAddrs, RingConsumer, RingError, RingProducer};
use tcmlink_common::msgbuf::MemOps;

/// Aligned shared-memory stand-in for one simulated link.
struct FuzzMem {
    storage: UnsafeCell<Vec<u64>>,
    base_addr: u64,
}

impl FuzzMem {
    fn new(bytes: usize) -> Self {
        let words = bytes.div_ceil(8);
        let storage = vec![0u64; words];
        let base_addr = storage.as_ptr() as u64;
        Self {
            storage: UnsafeCell::new(storage),
            base_addr,
        }
    }

    fn ptr_for_addr(&self, addr: u64) -> *mut u8 {
        let storage = unsafe { &mut *self.storage.get() };
        let base = storage.as_mut_ptr().cast::<u8>();
        base.wrapping_add((addr - self.base_addr) as usize)
    }
}

impl MemOps for Rc<FuzzMem> {
    type Error = std::convert::Infallible;

    fn read(&self, addr: u64, dst: &mut [u8]) -> Result<usize, Self::Error> {
        let src = self.ptr_for_addr(addr);
        unsafe { ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
        Ok(dst.len())
    }

    fn write(&self, addr: u64, src: &[u8]) -> Result<usize, Self::Error> {
        let dst = self.ptr_for_addr(addr);
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
        Ok(src.len())
    }

    fn load_acquire_u16(&self, addr: u64) -> Result<u16, Self::Error> {
        let ptr = self.ptr_for_addr(addr).cast::<AtomicU16>();
        Ok(unsafe { (*ptr).load(Ordering::Acquire) })
    }

    fn store_release_u16(&self, addr: u64, val: u16) -> Result<(), Self::Error> {
        let ptr = self.ptr_for_addr(addr).cast::<AtomicU16>();
        unsafe { (*ptr).store(val, Ordering::Release) };
        Ok(())
    }

    fn load_acquire_u32(&self, addr: u64) -> Result<u32, Self::Error> {
        let ptr = self.ptr_for_addr(addr).cast::<AtomicU32>();
        Ok(unsafe { (*ptr).load(Ordering::Acquire) })
    }

    fn store_release_u32(&self, addr: u64, val: u32) -> Result<(), Self::Error> {
        let ptr = self.ptr_for_addr(addr).cast::<AtomicU32>();
        unsafe { (*ptr).store(val, Ordering::Release) };
        Ok(())
    }
}

#[derive(Arbitrary, Debug)]
enum Op {
    /// Producer reserves up to n slots, fills them, publishes.
    Produce(u8),
    /// Producer demands exactly n contiguous slots.
    ProduceExact(u8),
    /// Consumer drains up to n slots.
    Consume(u8),
    /// Somebody moves the opaque event marker.
    MoveEventOffset(u16),
}

#[derive(Arbitrary, Debug)]
struct Schedule {
    capacity: u8,
    ops: Vec<Op>,
}

const ITEM_LEN: u16 = 4;

fuzz_target!(|schedule: Schedule| {
    // capacity in [2, 257]; anything smaller is rejected by construction
    let capacity = schedule.capacity as u16 + 2;

    let slot_bytes = (capacity as usize * ITEM_LEN as usize + 3) & !3;
    let mem = Rc::new(FuzzMem::new(slot_bytes + 8));
    let slot_base = mem.base_addr;

    let addrs = RingAddrs {
        slot_base,
        w_idx_addr: slot_base + slot_bytes as u64,
        r_idx_addr: slot_base + slot_bytes as u64 + 2,
        e_idx_addr: slot_base + slot_bytes as u64 + 4,
    };

    let desc = RingMem::new(
        0,
        RingKind::Common,
        capacity,
        ITEM_LEN,
        slot_base,
        capacity as u32 * ITEM_LEN as u32,
    )
    .unwrap();
    let state = RingState::new_inited(0);

    let mut producer = RingProducer::attach(mem.clone(), desc, state, addrs).unwrap();
    let mut consumer = RingConsumer::attach(mem.clone(), desc, state, addrs).unwrap();

    // Reference model: the byte pattern of every in-flight slot, in order.
    let mut inflight: VecDeque<u8> = VecDeque::new();
    let mut next_pattern: u8 = 0;

    for op in schedule.ops {
        match op {
            Op::Produce(n) => {
                let n = n as u16;
                match producer.write_slots(n.max(1)) {
                    Ok(run) => {
                        assert!(run.count >= 1 && run.count <= n.max(1));
                        assert!(run.first as u32 + run.count as u32 <= capacity as u32);
                        for i in 0..run.count {
                            let pattern = next_pattern;
                            next_pattern = next_pattern.wrapping_add(1);
                            let slot = [pattern; ITEM_LEN as usize];
                            mem.write(run.addr + i as u64 * ITEM_LEN as u64, &slot)
                                .unwrap();
                            inflight.push_back(pattern);
                        }
                        producer.publish(run.count).unwrap();
                    }
                    Err(RingError::WouldBlock) => {
                        // model agrees the ring is full or the run is empty
                        assert!(inflight.len() == capacity as usize - 1);
                    }
                    Err(e) => panic!("unexpected producer error: {e:?}"),
                }
            }
            Op::ProduceExact(n) => {
                let n = (n as u16 % capacity).max(1);
                if let Ok(run) = producer.try_reserve_exact(n) {
                    assert_eq!(run.count, n);
                    assert!(run.first as u32 + run.count as u32 <= capacity as u32);
                    for i in 0..run.count {
                        let pattern = next_pattern;
                        next_pattern = next_pattern.wrapping_add(1);
                        let slot = [pattern; ITEM_LEN as usize];
                        mem.write(run.addr + i as u64 * ITEM_LEN as u64, &slot)
                            .unwrap();
                        inflight.push_back(pattern);
                    }
                    producer.publish(run.count).unwrap();
                }
            }
            Op::Consume(n) => {
                let n = n as u16;
                match consumer.read_slots(n.max(1)) {
                    Ok(run) => {
                        for i in 0..run.count {
                            let mut slot = [0u8; ITEM_LEN as usize];
                            mem.read(run.addr + i as u64 * ITEM_LEN as u64, &mut slot)
                                .unwrap();
                            let expect = inflight.pop_front().expect("model empty, ring was not");
                            assert_eq!(slot, [expect; ITEM_LEN as usize], "payload corrupted");
                        }
                        consumer.consume(run.count).unwrap();
                    }
                    Err(RingError::WouldBlock) => {
                        assert!(inflight.is_empty());
                    }
                    Err(e) => panic!("unexpected consumer error: {e:?}"),
                }
            }
            Op::MoveEventOffset(v) => {
                producer.set_event_offset(v).unwrap();
                assert_eq!(consumer.event_offset().unwrap(), v);
            }
        }

        // the defining invariant, after every step
        let active = consumer.active().unwrap();
        let available = producer.available().unwrap();
        assert_eq!(active as usize, inflight.len());
        assert_eq!(active + available, capacity - 1);
    }
});
