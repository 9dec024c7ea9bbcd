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

use crate::error::{EngineError, VerifyCode};
use crate::hash::Hash;
use crate::proof::Proof;
use crate::value::Value;

/// A single buffered mutation, as produced by a virtual batch and consumed
/// by [`Engine::tx_apply_batch`]. Order matters: later ops override earlier
/// ones on the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
	Insert(Hash, Value),
	Remove(Hash),
}

/// Size accounting for an on-disk tree directory, returned by
/// [`Engine::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct StoreStat {
	pub size: u64,
	pub files: u64,
}

/// The blocking trie primitives the core's worker pool calls. Everything in
/// this trait runs on a pool thread and may block on disk I/O; it never
/// touches the caller's scheduler (spec.md §4.2).
///
/// `Engine` itself represents one open tree handle. Transactions and
/// iterators are represented by the opaque, `Send`-able handle types the
/// trait associates, which the engine alone knows how to interpret; the
/// core never inspects their contents.
pub trait Engine: Sized + Send + Sync + 'static {
	/// An engine-level transaction handle: a view pinned at a root, with or
	/// without a pending buffer of writes.
	type TxHandle: Send + 'static;
	/// An engine-level iterator handle, bound to the transaction that
	/// created it.
	type IterHandle: Send + 'static;

	/// Opens (or creates) the tree directory at `prefix`. Fails with
	/// `BadOpen` if the path is invalid or already locked by another open
	/// handle.
	fn open(prefix: &str) -> Result<Self, EngineError>;

	/// Releases the engine's resources. Infallible at this layer; any
	/// flush failure is expected to have already surfaced from a prior
	/// `commit`.
	fn close(self);

	/// The tree's current committed root.
	fn root(&self) -> Hash;

	/// Point lookup at an arbitrary (historical or current) root.
	fn get(&self, root: Hash, key: &Hash) -> Result<Option<Value>, EngineError>;

	/// Existence check at an arbitrary root. The default delegates to
	/// [`Engine::get`]; engines with a cheaper existence-only path may
	/// override it.
	fn has(&self, root: Hash, key: &Hash) -> Result<bool, EngineError> {
		Ok(self.get(root, key)?.is_some())
	}

	/// Produces a compact membership/non-membership proof for `key` against
	/// `root`.
	fn prove(&self, root: Hash, key: &Hash) -> Result<Proof, EngineError>;

	/// Checks that `root` is a historical root the engine can still serve
	/// reads against. Does not mutate any handle; the core applies the
	/// resulting root itself.
	fn check_root(&self, root: Hash) -> Result<(), EngineError>;

	/// Rewrites the on-disk log at `tmp_prefix` so that it contains only
	/// nodes reachable from `root`, then atomically replaces the engine's
	/// backing files.
	fn compact(&self, tmp_prefix: &str, root: Hash) -> Result<(), EngineError>;

	/// Removes all on-disk state at `prefix`. Refuses if the directory is
	/// locked or its metadata is inconsistent.
	fn destroy(prefix: &str) -> Result<(), EngineError>;

	/// Byte/file accounting for the tree directory at `prefix`.
	fn stat(prefix: &str) -> Result<StoreStat, EngineError>;

	/// Pure verification function: never panics on malformed `proof` bytes.
	fn verify(root: Hash, key: &Hash, proof: &Proof) -> (VerifyCode, Option<Value>);

	/// Opens an engine-level transaction pinned at `root`.
	fn tx_open(&self, root: Hash) -> Result<Self::TxHandle, EngineError>;

	/// The transaction's current root: for a batch, reflects buffered
	/// writes; for a snapshot, always the root it was opened with.
	fn tx_root(&self, tx: &Self::TxHandle) -> Hash;

	fn tx_get(&self, tx: &Self::TxHandle, key: &Hash) -> Result<Option<Value>, EngineError>;

	fn tx_has(&self, tx: &Self::TxHandle, key: &Hash) -> Result<bool, EngineError> {
		Ok(self.tx_get(tx, key)?.is_some())
	}

	fn tx_prove(&self, tx: &Self::TxHandle, key: &Hash) -> Result<Proof, EngineError>;

	/// Rebinds `tx`'s view to a different (historical) root. Fails
	/// `NotFound` if the engine cannot serve reads at that root.
	fn tx_inject(&self, tx: &mut Self::TxHandle, root: Hash) -> Result<(), EngineError>;

	/// Applies one buffered mutation directly (used by a batch's
	/// `insert`/`remove` when there is no virtual buffering in front of
	/// it).
	fn tx_apply_one(&self, tx: &mut Self::TxHandle, op: Op) -> Result<(), EngineError>;

	/// Applies an ordered sequence of buffered mutations in one call — the
	/// virtual batch's flush primitive.
	fn tx_apply_batch(&self, tx: &mut Self::TxHandle, ops: &[Op]) -> Result<(), EngineError> {
		for op in ops {
			self.tx_apply_one(tx, op.clone())?;
		}
		Ok(())
	}

	/// Commits a batch's buffered writes, producing (and becoming) the new
	/// root. Leaves the transaction open and usable afterwards.
	fn tx_commit(&self, tx: &mut Self::TxHandle) -> Result<Hash, EngineError>;

	/// Discards buffered writes, returning the transaction to its
	/// init-root.
	fn tx_clear(&self, tx: &mut Self::TxHandle);

	fn tx_close(&self, tx: Self::TxHandle);

	/// Opens a forward cursor over `tx`'s view, in lexicographic key order,
	/// fixed as of this call (spec.md invariant I7).
	fn iter_open(&self, tx: &Self::TxHandle) -> Self::IterHandle;

	/// Fills up to `max` more `(key, value)` pairs in ascending order. An
	/// empty vector signals end-of-iteration.
	fn iter_next_batch(
		&self,
		iter: &mut Self::IterHandle,
		max: usize,
	) -> Result<Vec<(Hash, Value)>, EngineError>;

	fn iter_close(&self, iter: Self::IterHandle);
}
