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

//! The virtual batch buffer (spec §4.5): an ordered op log plus a
//! key-indexed cache of what each buffered op currently resolves to. Pure
//! data structure, no I/O — `Transaction` owns one of these when it is a
//! `vbatch` and decides when to flush it through the engine.

use std::collections::HashMap;

use urkel_primitives::{Hash, Op, Value};

/// `insert`/`remove` synchronously update both `ops` (replayed in order by
/// `Engine::tx_apply_batch` on flush) and `cache` (what a same-key
/// `get`/`has` should answer without touching the engine). Invariant I8:
/// `cache` either holds the answer, or the key isn't in `cache` at all and
/// the caller must flush to find out.
#[derive(Default)]
pub struct VBatch {
	ops: Vec<Op>,
	cache: HashMap<Hash, Option<Value>>,
}

impl VBatch {
	pub fn new() -> Self {
		VBatch {
			ops: Vec::new(),
			cache: HashMap::new(),
		}
	}

	pub fn is_flushed(&self) -> bool {
		self.ops.is_empty()
	}

	pub fn insert(&mut self, key: Hash, value: Value) {
		self.cache.insert(key, Some(value.clone()));
		self.ops.push(Op::Insert(key, value));
	}

	pub fn remove(&mut self, key: Hash) {
		self.cache.insert(key, None);
		self.ops.push(Op::Remove(key));
	}

	/// `Some(Some(v))` = cached insert, `Some(None)` = cached remove
	/// (known-absent), `None` = not cached, caller must flush then ask the
	/// engine.
	pub fn cached(&self, key: &Hash) -> Option<Option<&Value>> {
		self.cache.get(key).map(|v| v.as_ref())
	}

	/// The buffered ops, in application order, for a flush call. Does not
	/// clear the buffer — the caller clears it only once the engine call
	/// actually succeeds (spec: "on failure the buffer survives").
	pub fn pending_ops(&self) -> &[Op] {
		&self.ops
	}

	pub fn clear(&mut self) {
		self.ops.clear();
		self.cache.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(b: u8) -> Hash {
		let mut bytes = [0u8; 32];
		bytes[0] = b;
		Hash::from(bytes)
	}

	fn val(s: &str) -> Value {
		Value::new(s.as_bytes().to_vec()).unwrap()
	}

	#[test]
	fn later_ops_on_same_key_override_the_cache() {
		let mut b = VBatch::new();
		b.insert(key(1), val("v1"));
		b.insert(key(1), val("v2"));
		b.remove(key(1));
		b.insert(key(1), val("v3"));
		assert_eq!(b.cached(&key(1)), Some(Some(&val("v3"))));
		assert_eq!(b.pending_ops().len(), 4);
	}

	#[test]
	fn remove_caches_known_absent_not_unknown() {
		let mut b = VBatch::new();
		b.remove(key(1));
		assert_eq!(b.cached(&key(1)), Some(None));
		assert_eq!(b.cached(&key(2)), None);
	}

	#[test]
	fn clear_drops_ops_and_cache() {
		let mut b = VBatch::new();
		b.insert(key(1), val("v"));
		assert!(!b.is_flushed());
		b.clear();
		assert!(b.is_flushed());
		assert_eq!(b.cached(&key(1)), None);
	}
}
