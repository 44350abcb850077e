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

//! Ring Cursor Arithmetic
//!
//! The wraparound math shared by every message ring, host side and device
//! side alike. Host driver and device firmware are built from different
//! codebases; keeping this arithmetic in one spot is what keeps their notion
//! of "full" and "empty" from drifting apart.
//!
//! Every ring reserves one slot: cursors are equal exactly when the ring is
//! empty, and the ring is full at `capacity - 1` active items. A producer
//! that advanced its write cursor onto the read cursor would make a full
//! ring indistinguishable from an empty one, so
//! [`available_to_write`] never reports that last slot as free.
//!
//! All cursors are slot indices in `[0, capacity)`; callers validate
//! anything read from the other side of the link before it gets here.

/// Advance a cursor one slot, wrapping at `capacity`.
///
/// The single wraparound point of the whole transport.
#[inline]
pub const fn advance(i: u16, capacity: u16) -> u16 {
    debug_assert!(capacity > 1);
    debug_assert!(i < capacity);
    if i + 1 < capacity { i + 1 } else { 0 }
}

/// Number of items produced but not yet consumed.
#[inline]
pub const fn active_count(rd: u16, wr: u16, capacity: u16) -> u16 {
    debug_assert!(capacity > 1);
    debug_assert!(rd < capacity && wr < capacity);
    if wr >= rd {
        wr - rd
    } else {
        capacity - rd + wr
    }
}

/// Number of slots the producer may still fill without overtaking the
/// consumer. One slot is always held back to keep `wr == rd` unambiguous.
#[inline]
pub const fn available_to_write(rd: u16, wr: u16, capacity: u16) -> u16 {
    capacity - active_count(rd, wr, capacity) - 1
}

/// Advisory check that at least one slot is writable. The caller owns the
/// retry/backpressure policy; nothing here blocks or spins.
#[inline]
pub const fn has_write_space(rd: u16, wr: u16, capacity: u16) -> bool {
    available_to_write(rd, wr, capacity) > 0
}

/// Length of the contiguous writable run starting at `wr`, bounded by the
/// end of the buffer or by the consumer's cursor, whichever comes first.
///
/// Distinct from [`available_to_write`]: a producer copying `n` slots in one
/// shot must satisfy both, or split the copy at the wrap point.
#[inline]
pub const fn contiguous_write_space(rd: u16, wr: u16, capacity: u16) -> u16 {
    debug_assert!(capacity > 1);
    debug_assert!(rd < capacity && wr < capacity);
    if wr >= rd {
        capacity - wr
    } else {
        rd - wr
    }
}

/// Length of the contiguous readable run starting at `rd`.
#[inline]
pub const fn contiguous_read_space(rd: u16, wr: u16, capacity: u16) -> u16 {
    debug_assert!(capacity > 1);
    debug_assert!(rd < capacity && wr < capacity);
    if wr >= rd {
        wr - rd
    } else {
        capacity - rd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_steps_and_wraps() {
        assert_eq!(advance(0, 4), 1);
        assert_eq!(advance(2, 4), 3);
        assert_eq!(advance(3, 4), 0);
        // wrap at the boundary for any capacity > 1
        for capacity in 2..64 {
            assert_eq!(advance(capacity - 1, capacity), 0);
        }
    }

    #[test]
    fn active_plus_available_is_capacity_minus_one() {
        for capacity in 2..32u16 {
            for rd in 0..capacity {
                for wr in 0..capacity {
                    assert_eq!(
                        active_count(rd, wr, capacity) + available_to_write(rd, wr, capacity),
                        capacity - 1,
                        "rd={rd} wr={wr} capacity={capacity}"
                    );
                }
            }
        }
    }

    #[test]
    fn equal_cursors_mean_empty() {
        for capacity in 2..32u16 {
            for rd in 0..capacity {
                assert_eq!(active_count(rd, rd, capacity), 0);
                assert_eq!(available_to_write(rd, rd, capacity), capacity - 1);
            }
        }
    }

    #[test]
    fn fill_to_capacity_minus_one_is_full() {
        let capacity = 8u16;
        let rd = 3u16;
        let mut wr = rd;
        for produced in 1..capacity {
            wr = advance(wr, capacity);
            assert_eq!(active_count(rd, wr, capacity), produced);
        }
        assert_eq!(available_to_write(rd, wr, capacity), 0);
        assert!(!has_write_space(rd, wr, capacity));
        // one more advance would land on rd and read as empty
        assert_eq!(advance(wr, capacity), rd);
    }

    #[test]
    fn wrapped_write_cursor_counts_correctly() {
        for capacity in 2..32u16 {
            assert_eq!(active_count(capacity - 1, 0, capacity), 1);
        }
        // wrapped scenario: rd=6, wr=2 on a capacity-8 ring
        assert_eq!(active_count(6, 2, 8), 4);
        assert_eq!(available_to_write(6, 2, 8), 3);
        assert_eq!(contiguous_write_space(6, 2, 8), 4);
    }

    #[test]
    fn contiguous_space_is_bounded_by_buffer_end_and_consumer() {
        // wr ahead of rd: run ends at the buffer end
        assert_eq!(contiguous_write_space(0, 5, 8), 3);
        assert_eq!(contiguous_write_space(2, 2, 8), 6);
        // wr behind rd: run ends at the consumer
        for capacity in 2..32u16 {
            for rd in 0..capacity {
                for wr in 0..rd {
                    assert_eq!(contiguous_write_space(rd, wr, capacity), rd - wr);
                    // the run never reaches the read cursor
                    assert!(wr + contiguous_write_space(rd, wr, capacity) <= rd);
                }
            }
        }
    }

    #[test]
    fn contiguous_space_never_exceeds_total_free() {
        // except for the reserved slot, which only the total accounts for
        for capacity in 2..24u16 {
            for rd in 0..capacity {
                for wr in 0..capacity {
                    let contig = contiguous_write_space(rd, wr, capacity);
                    let avail = available_to_write(rd, wr, capacity);
                    assert!(contig <= avail + 1, "rd={rd} wr={wr} capacity={capacity}");
                }
            }
        }
    }

    #[test]
    fn contiguous_read_matches_active_when_unwrapped() {
        assert_eq!(contiguous_read_space(2, 6, 8), 4);
        assert_eq!(contiguous_read_space(6, 2, 8), 2); // run stops at buffer end
        for capacity in 2..24u16 {
            for rd in 0..capacity {
                for wr in rd..capacity {
                    assert_eq!(
                        contiguous_read_space(rd, wr, capacity),
                        active_count(rd, wr, capacity)
                    );
                }
            }
        }
    }

    #[test]
    fn fill_and_drain_scenario() {
        // capacity-4 ring: fill to 3, drain 2
        let capacity = 4u16;
        let rd = 0u16;
        let mut wr = 0u16;
        assert_eq!(active_count(rd, wr, capacity), 0);

        for _ in 0..3 {
            wr = advance(wr, capacity);
        }
        assert_eq!(wr, 3);
        assert_eq!(active_count(rd, wr, capacity), 3);
        assert_eq!(available_to_write(rd, wr, capacity), 0);

        let mut rd = rd;
        rd = advance(rd, capacity);
        rd = advance(rd, capacity);
        assert_eq!(rd, 2);
        assert_eq!(active_count(rd, wr, capacity), 1);
        assert_eq!(available_to_write(rd, wr, capacity), 2);
    }
}
