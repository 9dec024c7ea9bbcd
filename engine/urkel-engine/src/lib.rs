// This file is part of urkel-store.

// Copyright (C) 2025 urkel-store authors.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A concrete `Engine`: a base-2 Merkle trie over BLAKE2b-256 keys, plus
//! two backends — [`disk::DiskEngine`] for the on-disk append-only log
//! layout in spec.md §6, and [`memory::MemoryEngine`] for the `memory: bool`
//! in-process option. Node layout, proof encoding, and hashing are this
//! crate's own business; `urkel-store` only ever calls through the
//! `urkel_primitives::Engine` trait.

mod codec;
mod disk;
mod handle;
mod hashing;
mod memory;
mod trie;

pub use disk::DiskEngine;
pub use handle::{IterHandle, TxHandle};
pub use memory::MemoryEngine;
pub use trie::COLLISION_BIT;
