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

use parking_lot::RwLock;

use urkel_primitives::{Engine, EngineError, Hash, Op, Proof, StoreStat, Value, VerifyCode};

use crate::codec;
use crate::handle::{IterHandle, TxHandle};
use crate::trie::{self, NodeStore};

/// An `Engine` backed by nothing but a `HashMap`. Used when `StoreOptions`'s
/// `memory` flag is set — the whole tree lives and dies with the process,
/// there is no `prefix` directory, and `destroy`/`stat` are no-ops.
pub struct MemoryEngine {
	nodes: RwLock<NodeStore>,
	root: RwLock<Hash>,
}

impl Engine for MemoryEngine {
	type TxHandle = TxHandle;
	type IterHandle = IterHandle;

	fn open(_prefix: &str) -> Result<Self, EngineError> {
		Ok(MemoryEngine {
			nodes: RwLock::new(NodeStore::new()),
			root: RwLock::new(Hash::ZERO),
		})
	}

	fn close(self) {}

	fn root(&self) -> Hash {
		*self.root.read()
	}

	fn get(&self, root: Hash, key: &Hash) -> Result<Option<Value>, EngineError> {
		trie::get(&self.nodes.read(), root, key)
	}

	fn prove(&self, root: Hash, key: &Hash) -> Result<Proof, EngineError> {
		let walk = trie::walk(&self.nodes.read(), root, key)?;
		Ok(codec::encode(walk))
	}

	fn check_root(&self, root: Hash) -> Result<(), EngineError> {
		if root.is_zero() || self.nodes.read().contains_key(&root) {
			Ok(())
		} else {
			Err(EngineError::NotFound)
		}
	}

	fn compact(&self, _tmp_prefix: &str, _root: Hash) -> Result<(), EngineError> {
		// Nothing to garbage-collect on disk; the in-memory map keeps every
		// historical node for the engine's own lifetime.
		Ok(())
	}

	fn destroy(_prefix: &str) -> Result<(), EngineError> {
		Ok(())
	}

	fn stat(_prefix: &str) -> Result<StoreStat, EngineError> {
		Ok(StoreStat::default())
	}

	fn verify(root: Hash, key: &Hash, proof: &Proof) -> (VerifyCode, Option<Value>) {
		codec::verify(root, key, proof)
	}

	fn tx_open(&self, root: Hash) -> Result<Self::TxHandle, EngineError> {
		self.check_root(root)?;
		Ok(TxHandle { root })
	}

	fn tx_root(&self, tx: &Self::TxHandle) -> Hash {
		tx.root
	}

	fn tx_get(&self, tx: &Self::TxHandle, key: &Hash) -> Result<Option<Value>, EngineError> {
		trie::get(&self.nodes.read(), tx.root, key)
	}

	fn tx_prove(&self, tx: &Self::TxHandle, key: &Hash) -> Result<Proof, EngineError> {
		let walk = trie::walk(&self.nodes.read(), tx.root, key)?;
		Ok(codec::encode(walk))
	}

	fn tx_inject(&self, tx: &mut Self::TxHandle, root: Hash) -> Result<(), EngineError> {
		self.check_root(root)?;
		tx.root = root;
		Ok(())
	}

	fn tx_apply_one(&self, tx: &mut Self::TxHandle, op: Op) -> Result<(), EngineError> {
		let mut nodes = self.nodes.write();
		tx.root = match op {
			Op::Insert(key, value) => trie::insert(&mut nodes, tx.root, 0, key, value)?,
			Op::Remove(key) => trie::remove(&mut nodes, tx.root, 0, key)?,
		};
		Ok(())
	}

	fn tx_commit(&self, tx: &mut Self::TxHandle) -> Result<Hash, EngineError> {
		*self.root.write() = tx.root;
		Ok(tx.root)
	}

	fn tx_clear(&self, tx: &mut Self::TxHandle) {
		tx.root = *self.root.read();
	}

	fn tx_close(&self, _tx: Self::TxHandle) {}

	fn iter_open(&self, tx: &Self::TxHandle) -> Self::IterHandle {
		let items = trie::collect_in_order(&self.nodes.read(), tx.root).unwrap_or_default();
		IterHandle { items, pos: 0 }
	}

	fn iter_next_batch(&self, iter: &mut Self::IterHandle, max: usize) -> Result<Vec<(Hash, Value)>, EngineError> {
		let end = (iter.pos + max).min(iter.items.len());
		let batch = iter.items[iter.pos..end].to_vec();
		iter.pos = end;
		Ok(batch)
	}

	fn iter_close(&self, _iter: Self::IterHandle) {}
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
	fn insert_commit_get_roundtrips() {
		let engine = MemoryEngine::open("unused").unwrap();
		let mut tx = engine.tx_open(engine.root()).unwrap();
		engine.tx_apply_one(&mut tx, Op::Insert(key(1), val("a"))).unwrap();
		let root = engine.tx_commit(&mut tx).unwrap();
		assert_eq!(engine.get(root, &key(1)).unwrap(), Some(val("a")));
		engine.tx_close(tx);
	}

	#[test]
	fn iterator_is_fixed_at_open_time() {
		let engine = MemoryEngine::open("unused").unwrap();
		let mut tx = engine.tx_open(engine.root()).unwrap();
		for i in 1..=3u8 {
			engine
				.tx_apply_one(&mut tx, Op::Insert(key(i), val("v")))
				.unwrap();
		}
		engine.tx_commit(&mut tx).unwrap();
		let mut iter = engine.iter_open(&tx);
		engine
			.tx_apply_one(&mut tx, Op::Insert(key(9), val("late")))
			.unwrap();
		engine.tx_commit(&mut tx).unwrap();
		let mut seen = Vec::new();
		loop {
			let batch = engine.iter_next_batch(&mut iter, 2).unwrap();
			if batch.is_empty() {
				break;
			}
			seen.extend(batch.into_iter().map(|(k, _)| k));
		}
		assert_eq!(seen.len(), 3);
		assert!(!seen.contains(&key(9)));
	}
}
