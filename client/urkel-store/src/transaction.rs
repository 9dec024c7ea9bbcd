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

//! The Transaction component (spec §4.4): a snapshot, a batch, or a batch
//! fronted by a virtual buffer, pinned at a root and holding a strong
//! back-reference to the tree that opened it (the "pin", spec §9's
//! redesign flag for the parent/child cycle). Closing a transaction
//! schedules the close of every child iterator first (invariant I5).

use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::Mutex;

use urkel_primitives::{Engine, Hash, Op, Proof, Value};

use crate::debug::IterDebugInfo;
use crate::dlist::{DList, Token};
use crate::error::CoreError;
use crate::iterator::{Iter, IterShared};
use crate::lifecycle::{ready_err, FinalAction, HandleState, Lifecycle};
use crate::tree::Tree;
use crate::vbatch::VBatch;
use crate::worker::WorkerPool;

pub(crate) enum TxKind {
	Snapshot,
	Batch,
	VirtualBatch(VBatch),
}

pub(crate) struct TxShared<E: Engine> {
	pub(crate) pool: Arc<WorkerPool>,
	pub(crate) inner: Mutex<TxInner<E>>,
}

pub(crate) struct TxInner<E: Engine> {
	lifecycle: Lifecycle,
	/// The pin: strong reference back to the parent tree, released only at
	/// `FinalAction::Cleanup` (breaks the Tree <-> Transaction cycle).
	tree: Option<Tree<E>>,
	tree_token: Option<Token>,
	engine: Option<Arc<E>>,
	handle: Option<E::TxHandle>,
	kind: TxKind,
	children: DList<Arc<IterShared<E>>>,
	close_waiters: Vec<oneshot::Sender<()>>,
	default_iter_capacity: usize,
}

impl<E: Engine> TxInner<E> {
	pub(crate) fn lifecycle_state(&self) -> HandleState {
		self.lifecycle.state()
	}

	pub(crate) fn is_close_queued(&self) -> bool {
		self.lifecycle.is_close_queued()
	}

	pub(crate) fn workers_in_flight(&self) -> u32 {
		self.lifecycle.workers_in_flight()
	}

	pub(crate) fn children_len(&self) -> usize {
		self.children.len()
	}

	pub(crate) fn any_iter_close_queued(&self) -> bool {
		self.children.iter().any(|it| it.inner.lock().is_close_queued())
	}

	pub(crate) fn children_debug(&self) -> Vec<IterDebugInfo> {
		self.children.iter().map(|it| it.inner.lock().debug_info()).collect()
	}
}

/// A handle to an open (or not-yet-open) transaction. Cheap to clone.
pub struct Transaction<E: Engine> {
	pub(crate) shared: Arc<TxShared<E>>,
}

impl<E: Engine> Clone for Transaction<E> {
	fn clone(&self) -> Self {
		Transaction {
			shared: self.shared.clone(),
		}
	}
}

/// See `Tree`'s `Drop` impl: the same owner-drop-as-cleanup-request
/// contract applies one level down.
impl<E: Engine> Drop for Transaction<E> {
	fn drop(&mut self) {
		if Arc::strong_count(&self.shared) != 1 {
			return;
		}
		let shared = self.shared.clone();
		let should_pump = match shared.inner.try_lock() {
			Some(mut inner) => {
				if inner.lifecycle.state() == HandleState::Closed {
					false
				} else {
					let has_children = !inner.children.is_empty();
					inner.lifecycle.request_cleanup(has_children);
					true
				}
			}
			None => false,
		};
		if should_pump {
			let pool = shared.pool.clone();
			pool.spawn_detached(move || {
				futures::executor::block_on(Transaction::<E>::pump_shared(&shared));
			});
		}
	}
}

impl<E: Engine> Transaction<E> {
	pub(crate) async fn open(tree: &Tree<E>, kind: TxKind, init_root: Option<Hash>) -> Result<Transaction<E>, CoreError> {
		let engine = tree.engine()?;
		let pool = tree.shared.pool.clone();
		let default_iter_capacity = tree.default_iter_capacity();
		let shared = Arc::new(TxShared {
			pool: pool.clone(),
			inner: Mutex::new(TxInner {
				lifecycle: Lifecycle::new(),
				tree: Some(tree.clone()),
				tree_token: None,
				engine: None,
				handle: None,
				kind,
				children: DList::new(),
				close_waiters: Vec::new(),
				default_iter_capacity,
			}),
		});
		let token = tree.register_tx(shared.clone());
		let root = {
			let mut inner = shared.inner.lock();
			inner.tree_token = Some(token);
			inner
				.lifecycle
				.begin_open()
				.expect("freshly constructed transaction lifecycle is Closed");
			match &inner.kind {
				TxKind::Snapshot => init_root.unwrap_or_else(|| engine.root()),
				TxKind::Batch | TxKind::VirtualBatch(_) => engine.root(),
			}
		};
		let opened = pool
			.schedule({
				let engine = engine.clone();
				move || engine.tx_open(root)
			})
			.await;
		match opened {
			Ok(handle) => {
				let mut inner = shared.inner.lock();
				inner.engine = Some(engine);
				inner.handle = Some(handle);
				inner.lifecycle.open_succeeded();
				drop(inner);
				Ok(Transaction { shared })
			}
			Err(e) => {
				// The tx never becomes usable, but it must still be
				// unregistered from the tree's child list on this
				// failure path, not only on a later explicit close.
				{
					let mut inner = shared.inner.lock();
					inner.lifecycle.open_failed();
					inner.tree = None;
				}
				tree.unregister_tx(token);
				tree.pump().await;
				Err(e.into())
			}
		}
	}

	pub fn state(&self) -> HandleState {
		self.shared.inner.lock().lifecycle.state()
	}

	pub async fn close(&self) {
		Self::close_shared(self.shared.clone()).await
	}

	pub(crate) async fn close_shared(shared: Arc<TxShared<E>>) {
		let rx = {
			let mut inner = shared.inner.lock();
			if inner.lifecycle.state() == HandleState::Closed {
				None
			} else {
				let (tx, rx) = oneshot::channel();
				inner.close_waiters.push(tx);
				let has_children = !inner.children.is_empty();
				inner.lifecycle.request_close(has_children);
				Some(rx)
			}
		};
		Self::pump(&shared).await;
		if let Some(rx) = rx {
			let _ = rx.await;
		}
	}

	fn root(&self) -> Result<Hash, CoreError> {
		let inner = self.shared.inner.lock();
		if let Some(err) = ready_err(inner.lifecycle.ready()) {
			return Err(err);
		}
		let engine = inner.engine.as_ref().expect("engine present while Open");
		let handle = inner.handle.as_ref().expect("handle present while Open");
		Ok(engine.tx_root(handle))
	}

	pub fn root_hash(&self) -> Result<Hash, CoreError> {
		self.root()
	}

	/// Flushes a virtual batch's buffered ops through the engine. A no-op
	/// for every other kind, and for an already-flushed virtual batch.
	async fn flush(&self) -> Result<(), CoreError> {
		let (engine, handle, ops) = {
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			let ops = match &inner.kind {
				TxKind::VirtualBatch(vb) if !vb.is_flushed() => vb.pending_ops().to_vec(),
				_ => return Ok(()),
			};
			let engine = inner.engine.clone().expect("engine present while Open");
			let handle = inner.handle.take().expect("handle present while Open");
			inner.lifecycle.begin_worker();
			(engine, handle, ops)
		};
		let pool = self.shared.pool.clone();
		let (engine, handle, result) = pool
			.schedule(move || {
				let mut handle = handle;
				let r = engine.tx_apply_batch(&mut handle, &ops);
				(engine, handle, r)
			})
			.await;
		let mut inner = self.shared.inner.lock();
		inner.engine = Some(engine);
		inner.handle = Some(handle);
		inner.lifecycle.end_worker();
		if result.is_ok() {
			if let TxKind::VirtualBatch(vb) = &mut inner.kind {
				vb.clear();
			}
		}
		drop(inner);
		self.pump().await;
		result.map_err(CoreError::from)
	}

	pub async fn get(&self, key: Hash) -> Result<Option<Value>, CoreError> {
		{
			let inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			if let TxKind::VirtualBatch(vb) = &inner.kind {
				if let Some(cached) = vb.cached(&key) {
					return Ok(cached.cloned());
				}
			}
		}
		self.flush().await?;
		let (engine, handle) = {
			let inner = self.shared.inner.lock();
			(
				inner.engine.clone().expect("engine present while Open"),
				*inner.handle.as_ref().expect("handle present while Open"),
			)
		};
		let pool = self.shared.pool.clone();
		Ok(pool.schedule(move || engine.tx_get(&handle, &key)).await?)
	}

	pub async fn has(&self, key: Hash) -> Result<bool, CoreError> {
		Ok(self.get(key).await?.is_some())
	}

	pub async fn prove(&self, key: Hash) -> Result<Proof, CoreError> {
		self.flush().await?;
		let (engine, handle) = {
			let inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			(
				inner.engine.clone().expect("engine present while Open"),
				*inner.handle.as_ref().expect("handle present while Open"),
			)
		};
		let pool = self.shared.pool.clone();
		Ok(pool.schedule(move || engine.tx_prove(&handle, &key)).await?)
	}

	pub async fn inject(&self, root: Hash) -> Result<(), CoreError> {
		self.flush().await?;
		let (engine, mut handle) = {
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			let engine = inner.engine.clone().expect("engine present while Open");
			let handle = inner.handle.take().expect("handle present while Open");
			inner.lifecycle.begin_worker();
			(engine, handle)
		};
		let pool = self.shared.pool.clone();
		let (engine, handle, result) = pool
			.schedule(move || {
				let r = engine.tx_inject(&mut handle, root);
				(engine, handle, r)
			})
			.await;
		let mut inner = self.shared.inner.lock();
		inner.engine = Some(engine);
		inner.handle = Some(handle);
		inner.lifecycle.end_worker();
		drop(inner);
		self.pump().await;
		result.map_err(CoreError::from)
	}

	/// Inserts into a plain batch immediately, or buffers into a virtual
	/// batch's op log without touching the engine. Refuses on a snapshot.
	pub async fn insert(&self, key: Hash, value: Value) -> Result<(), CoreError> {
		{
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			match &mut inner.kind {
				TxKind::Snapshot => return Err(CoreError::TxNotOpen),
				TxKind::VirtualBatch(vb) => {
					vb.insert(key, value);
					return Ok(());
				}
				TxKind::Batch => {}
			}
		}
		self.apply_one(Op::Insert(key, value)).await
	}

	pub async fn remove(&self, key: Hash) -> Result<(), CoreError> {
		{
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			match &mut inner.kind {
				TxKind::Snapshot => return Err(CoreError::TxNotOpen),
				TxKind::VirtualBatch(vb) => {
					vb.remove(key);
					return Ok(());
				}
				TxKind::Batch => {}
			}
		}
		self.apply_one(Op::Remove(key)).await
	}

	async fn apply_one(&self, op: Op) -> Result<(), CoreError> {
		let (engine, mut handle) = {
			let mut inner = self.shared.inner.lock();
			let engine = inner.engine.clone().expect("engine present while Open");
			let handle = inner.handle.take().expect("handle present while Open");
			inner.lifecycle.begin_worker();
			(engine, handle)
		};
		let pool = self.shared.pool.clone();
		let (engine, handle, result) = pool
			.schedule(move || {
				let r = engine.tx_apply_one(&mut handle, op);
				(engine, handle, r)
			})
			.await;
		let mut inner = self.shared.inner.lock();
		inner.engine = Some(engine);
		inner.handle = Some(handle);
		inner.lifecycle.end_worker();
		drop(inner);
		self.pump().await;
		result.map_err(CoreError::from)
	}

	/// Commits buffered writes, producing a new root. For a virtual batch,
	/// flushes first so the commit sees every buffered op.
	pub async fn commit(&self) -> Result<Hash, CoreError> {
		{
			let inner = self.shared.inner.lock();
			if let TxKind::Snapshot = inner.kind {
				return Err(CoreError::TxNotOpen);
			}
		}
		self.flush().await?;
		let (engine, mut handle) = {
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			let engine = inner.engine.clone().expect("engine present while Open");
			let handle = inner.handle.take().expect("handle present while Open");
			inner.lifecycle.begin_worker();
			(engine, handle)
		};
		let pool = self.shared.pool.clone();
		let (engine, handle, result) = pool
			.schedule(move || {
				let r = engine.tx_commit(&mut handle);
				(engine, handle, r)
			})
			.await;
		let mut inner = self.shared.inner.lock();
		inner.engine = Some(engine);
		inner.handle = Some(handle);
		inner.lifecycle.end_worker();
		drop(inner);
		self.pump().await;
		match &result {
			Ok(root) => log::debug!(target: "urkel", "batch committed, new root {root}"),
			Err(e) => log::warn!(target: "urkel", "batch commit failed: {e}"),
		}
		result.map_err(CoreError::from)
	}

	/// Discards buffered writes: the batch's uncommitted engine-side
	/// mutations for a plain batch, or the op log for a virtual batch.
	pub async fn clear(&self) -> Result<(), CoreError> {
		let mut inner = self.shared.inner.lock();
		if let Some(err) = ready_err(inner.lifecycle.ready()) {
			return Err(err);
		}
		match &mut inner.kind {
			TxKind::Snapshot => Err(CoreError::TxNotOpen),
			TxKind::VirtualBatch(vb) => {
				vb.clear();
				Ok(())
			}
			TxKind::Batch => {
				let engine = inner.engine.clone().expect("engine present while Open");
				let mut handle = inner.handle.take().expect("handle present while Open");
				engine.tx_clear(&mut handle);
				inner.handle = Some(handle);
				Ok(())
			}
		}
	}

	/// Opens a forward cursor over this transaction's current view.
	/// Refuses with `TxNotFlushed` on an unflushed virtual batch rather
	/// than flushing implicitly, so an iterator's fixed-as-of-open view
	/// (invariant I7) is never silently decided by this call.
	pub async fn iterator(&self, cache_capacity: usize) -> Result<Iter<E>, CoreError> {
		{
			let inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			if let TxKind::VirtualBatch(vb) = &inner.kind {
				if !vb.is_flushed() {
					return Err(CoreError::TxNotFlushed);
				}
			}
		}
		Iter::open(self, cache_capacity).await
	}

	/// Same as [`Transaction::iterator`], but defaults the cache capacity
	/// to the value configured on the tree this transaction was opened
	/// from (`StoreOptions::iterator.cache_capacity`), instead of
	/// requiring the caller to pick one.
	pub async fn iterator_default(&self) -> Result<Iter<E>, CoreError> {
		let cache_capacity = self.shared.inner.lock().default_iter_capacity;
		self.iterator(cache_capacity).await
	}

	pub(crate) fn register_iter(&self, shared: Arc<IterShared<E>>) -> Token {
		self.shared.inner.lock().children.insert(shared)
	}

	pub(crate) fn unregister_iter(&self, token: Token) {
		self.shared.inner.lock().children.remove(token);
	}

	pub(crate) fn engine_handle(&self) -> Result<Arc<E>, CoreError> {
		let inner = self.shared.inner.lock();
		if let Some(err) = ready_err(inner.lifecycle.ready()) {
			return Err(err);
		}
		Ok(inner.engine.clone().expect("engine present while Open"))
	}

	pub(crate) fn tx_handle_copy(&self) -> E::TxHandle {
		*self.shared.inner.lock().handle.as_ref().expect("handle present while Open")
	}

	pub(crate) fn pool(&self) -> Arc<WorkerPool> {
		self.shared.pool.clone()
	}

	async fn pump(&self) {
		Self::pump_shared(&self.shared).await
	}

	pub(crate) async fn pump_shared(shared: &Arc<TxShared<E>>) {
		loop {
			let action = {
				let mut inner = shared.inner.lock();
				let children_len = inner.children.len();
				inner.lifecycle.final_check(children_len)
			};
			match action {
				FinalAction::None => break,
				FinalAction::CloseChildren => {
					let children: Vec<Arc<IterShared<E>>> = {
						let inner = shared.inner.lock();
						inner.children.iter().cloned().collect()
					};
					let closes: Vec<_> = children.into_iter().map(Iter::close_shared).collect();
					futures::future::join_all(closes).await;
				}
				FinalAction::RunClose => {
					let (engine, handle) = {
						let mut inner = shared.inner.lock();
						(inner.engine.take(), inner.handle.take())
					};
					if let (Some(engine), Some(handle)) = (engine, handle) {
						let pool = shared.pool.clone();
						pool.schedule(move || engine.tx_close(handle)).await;
					}
					let mut inner = shared.inner.lock();
					inner.lifecycle.close_completed();
					let waiters: Vec<_> = inner.close_waiters.drain(..).collect();
					drop(inner);
					for w in waiters {
						let _ = w.send(());
					}
				}
				FinalAction::Cleanup => {
					let (tree, token) = {
						let mut inner = shared.inner.lock();
						(inner.tree.take(), inner.tree_token.take())
					};
					if let (Some(tree), Some(token)) = (tree, token) {
						tree.unregister_tx(token);
						tree.pump().await;
					}
					break;
				}
			}
		}
	}

}
