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

//! Constructor options (spec §6 "Configuration").

/// Default number of (key, value) pairs an on-disk iterator pre-fetches
/// per engine fill.
pub const DEFAULT_DISK_CACHE_CAPACITY: usize = 100;
/// The memory adapter has nothing to pre-fetch across (no disk I/O), so a
/// single slot is enough to keep the same code path exercised.
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 1;

/// Options passed to [`crate::Tree::open`]. `memory` selects
/// `urkel_engine::MemoryEngine` over `urkel_engine::DiskEngine` entirely at
/// the call site that picks `Tree<E>`'s `E`; this struct only carries the
/// options both backends read.
#[derive(Debug, Clone)]
pub struct StoreOptions {
	/// Tree directory path. Required for the on-disk engine; ignored by
	/// the in-memory one.
	pub prefix: String,
	/// Number of pool threads backing the worker pool.
	pub worker_threads: usize,
	pub iterator: IteratorOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct IteratorOptions {
	pub cache_capacity: usize,
}

impl Default for IteratorOptions {
	fn default() -> Self {
		IteratorOptions {
			cache_capacity: DEFAULT_DISK_CACHE_CAPACITY,
		}
	}
}

impl StoreOptions {
	pub fn new(prefix: impl Into<String>) -> Self {
		StoreOptions {
			prefix: prefix.into(),
			worker_threads: 4,
			iterator: IteratorOptions::default(),
		}
	}

	/// Convenience for the in-memory adapter's usual defaults.
	pub fn in_memory() -> Self {
		StoreOptions {
			prefix: String::new(),
			worker_threads: 1,
			iterator: IteratorOptions {
				cache_capacity: DEFAULT_MEMORY_CACHE_CAPACITY,
			},
		}
	}
}
