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

#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::panic))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::expect_used))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::unwrap_used))]
// We use Arbitrary during fuzzing, which requires std
#![cfg_attr(not(feature = "fuzzing"), no_std)]

extern crate alloc;

/// The host and the device firmware communicate through message rings in
/// shared memory: fixed-capacity circular buffers of fixed-size slots, each
/// with exactly one producer and one consumer. The device publishes a control
/// block in its tightly-coupled memory (TCM) describing where every ring and
/// every cursor lives; from then on the only synchronization on the wire is
/// the producer's release-store of its write index and the consumer's
/// acquire-load of it.
pub mod msgbuf;
