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

//! The concurrent lifecycle and resource-management layer above
//! `urkel-engine`'s blocking trie primitives: the handle state machine, the
//! Tree/Transaction/Iter triad, the virtual batch, and the debug
//! inspector (spec.md §§3-9).
//!
//! Every suspending method here dispatches its blocking engine work onto a
//! [`WorkerPool`](worker::WorkerPool) thread and resolves once, matching
//! the "single caller-side scheduler, blocking pool underneath" split the
//! specification calls out; callers who'd rather not suspend can reach for
//! the `_sync` variants that run inline.

mod config;
mod debug;
mod dlist;
mod error;
mod iterator;
mod lifecycle;
mod tree;
mod transaction;
mod vbatch;
mod worker;

pub use config::{IteratorOptions, StoreOptions, DEFAULT_DISK_CACHE_CAPACITY, DEFAULT_MEMORY_CACHE_CAPACITY};
pub use debug::{IterDebugInfo, TreeDebugInfo, TxDebugInfo};
pub use error::{CoreError, Failure};
pub use iterator::Iter;
pub use lifecycle::{HandleState, Ready};
pub use tree::Tree;
pub use transaction::Transaction;

pub use urkel_engine::{DiskEngine, MemoryEngine};
pub use urkel_primitives::{Engine, EngineError, Hash, Op, Proof, StoreStat, Value, VerifyCode, HASH_SIZE};

/// A store backed by the on-disk engine.
pub type DiskTree = Tree<DiskEngine>;
/// A store backed by the in-memory engine, for tests and ephemeral use.
pub type MemoryTree = Tree<MemoryEngine>;

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;

	fn key(b: u8) -> Hash {
		let mut bytes = [0u8; 32];
		bytes[0] = b;
		Hash::from(bytes)
	}

	fn val(s: &str) -> Value {
		Value::new(s.as_bytes().to_vec()).unwrap()
	}

	#[test]
	fn tree_built_from_store_options_opens_at_their_prefix() {
		block_on(async {
			let opts = StoreOptions::in_memory();
			let tree: MemoryTree = Tree::with_options(&opts);
			let root = tree.open_with(&opts).await.unwrap();
			assert_eq!(root, Hash::ZERO);
			tree.close().await;
		});
	}

	#[test]
	fn empty_tree_roundtrips_through_open_and_close() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			let root = tree.open("").await.unwrap();
			assert_eq!(root, Hash::ZERO);
			assert_eq!(tree.get(key(1)).await.unwrap(), None);
			tree.close().await;
			assert_eq!(tree.state(), HandleState::Closed);
		});
	}

	#[test]
	fn batch_commit_advances_root_and_snapshot_sees_old_root() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let initial_root = tree.root_hash().unwrap();

			let snap = tree.snapshot(None).await.unwrap();
			let batch = tree.transaction().await.unwrap();
			batch.insert(key(1), val("hello")).await.unwrap();
			let new_root = batch.commit().await.unwrap();
			batch.close().await;

			assert_ne!(new_root, initial_root);
			assert_eq!(snap.get(key(1)).await.unwrap(), None, "snapshot pinned at the old root");
			assert_eq!(tree.get(key(1)).await.unwrap(), Some(val("hello")));
			snap.close().await;
			tree.close().await;
		});
	}

	#[test]
	fn vbatch_buffers_until_a_read_forces_a_flush() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let vb = tree.vbatch().await.unwrap();
			vb.insert(key(1), val("a")).await.unwrap();
			vb.insert(key(2), val("b")).await.unwrap();
			// Still answered from the cache, no flush needed yet.
			assert_eq!(vb.get(key(1)).await.unwrap(), Some(val("a")));
			let root = vb.commit().await.unwrap();
			assert_ne!(root, Hash::ZERO);
			vb.close().await;
			tree.close().await;
		});
	}

	#[test]
	fn vbatch_created_iterator_refuses_while_unflushed() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let vb = tree.vbatch().await.unwrap();
			vb.insert(key(1), val("a")).await.unwrap();
			let err = vb.iterator(4).await.unwrap_err();
			assert_eq!(err.code(), "TX_NOT_FLUSHED");
			vb.close().await;
			tree.close().await;
		});
	}

	#[test]
	fn iterator_walks_seven_keys_in_order() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let batch = tree.transaction().await.unwrap();
			for i in 1..=7u8 {
				batch.insert(key(i), val(&format!("v{i}"))).await.unwrap();
			}
			batch.commit().await.unwrap();

			let snap = tree.snapshot(None).await.unwrap();
			let iter = snap.iterator(2).await.unwrap();
			let mut seen = Vec::new();
			while let Some((k, _)) = iter.next().await.unwrap() {
				seen.push(k);
			}
			assert_eq!(seen.len(), 7);
			let mut sorted = seen.clone();
			sorted.sort();
			assert_eq!(seen, sorted, "iterator yields keys in ascending order");
			iter.close().await;
			snap.close().await;
			batch.close().await;
			tree.close().await;
		});
	}

	#[test]
	fn closing_the_tree_cascades_to_open_transactions_and_iterators() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let batch = tree.transaction().await.unwrap();
			batch.insert(key(1), val("v")).await.unwrap();
			batch.commit().await.unwrap();
			let snap = tree.snapshot(None).await.unwrap();
			let iter = snap.iterator(4).await.unwrap();

			// No explicit close on batch/snap/iter: the tree's close must
			// cascade through both levels.
			tree.close().await;

			assert_eq!(tree.state(), HandleState::Closed);
			assert_eq!(batch.state(), HandleState::Closed);
			assert_eq!(snap.state(), HandleState::Closed);
			assert_eq!(iter.state(), HandleState::Closed);
		});
	}

	#[test]
	fn debug_info_reports_open_children_before_close() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let snap = tree.snapshot(None).await.unwrap();
			let info = tree.debug_info(true, false);
			assert_eq!(info.txs, 1);
			assert_eq!(info.state, "Open");
			assert!(info.to_json().contains("\"txs\":1"));
			snap.close().await;
			tree.close().await;
		});
	}

	#[test]
	fn dropping_a_transaction_or_iterator_without_close_eventually_cleans_up() {
		block_on(async {
			let tree: MemoryTree = Tree::new(2);
			tree.open("").await.unwrap();
			let snap = tree.snapshot(None).await.unwrap();
			{
				let _iter = snap.iterator(4).await.unwrap();
				// `_iter` drops here without an explicit close; its entry
				// in `snap`'s child registry must still be reclaimed.
			}
			let mut iters = tree.debug_info(true, true).transactions[0].iters;
			for _ in 0..200 {
				if iters == 0 {
					break;
				}
				std::thread::sleep(std::time::Duration::from_millis(5));
				iters = tree.debug_info(true, true).transactions[0].iters;
			}
			assert_eq!(iters, 0, "dropped iterator was never cleaned up");

			drop(snap);
			let mut txs = tree.debug_info(false, false).txs;
			for _ in 0..200 {
				if txs == 0 {
					break;
				}
				std::thread::sleep(std::time::Duration::from_millis(5));
				txs = tree.debug_info(false, false).txs;
			}
			assert_eq!(txs, 0, "dropped transaction was never cleaned up");
			tree.close().await;
		});
	}
}
