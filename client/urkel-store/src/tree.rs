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

//! The Tree component (spec §4.3): owns the engine handle, the current
//! committed root, and the registry of open transactions. Closing a tree
//! schedules the close of every child transaction first (invariant I5).

use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::Mutex;

use urkel_primitives::{Engine, Hash, Proof, StoreStat, Value};

use crate::config::StoreOptions;
use crate::dlist::{DList, Token};
use crate::error::CoreError;
use crate::lifecycle::{ready_err, FinalAction, HandleState, Lifecycle};
use crate::transaction::{Transaction, TxKind, TxShared};
use crate::worker::WorkerPool;

pub(crate) struct TreeShared<E: Engine> {
	pub(crate) pool: Arc<WorkerPool>,
	pub(crate) inner: Mutex<TreeInner<E>>,
}

pub(crate) struct TreeInner<E: Engine> {
	lifecycle: Lifecycle,
	/// Invariant I1: `Some` exactly while `state == Open`.
	engine: Option<Arc<E>>,
	prefix: String,
	children: DList<Arc<TxShared<E>>>,
	close_waiters: Vec<oneshot::Sender<()>>,
	default_iter_capacity: usize,
}

/// A handle to an open (or not-yet-open) Urkel tree. Cheap to clone: every
/// clone shares the same underlying state.
pub struct Tree<E: Engine> {
	pub(crate) shared: Arc<TreeShared<E>>,
}

impl<E: Engine> Clone for Tree<E> {
	fn clone(&self) -> Self {
		Tree {
			shared: self.shared.clone(),
		}
	}
}

/// Dropping the last handle without an explicit `close` is equivalent to
/// requesting a close plus scheduling cleanup via final-check (spec §5);
/// since `drop` cannot await, the resulting pump runs detached on the
/// worker pool instead of on the caller's thread.
impl<E: Engine> Drop for Tree<E> {
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
				futures::executor::block_on(Tree { shared }.pump());
			});
		}
	}
}

impl<E: Engine> Tree<E> {
	/// A fresh tree, in `Closed` state (spec §3 lifecycles). Transactions
	/// opened from it default their iterators to
	/// [`crate::config::DEFAULT_DISK_CACHE_CAPACITY`]; use
	/// [`Tree::with_options`] to configure a different default.
	pub fn new(worker_threads: usize) -> Self {
		Self::new_with_iter_capacity(worker_threads, crate::config::DEFAULT_DISK_CACHE_CAPACITY)
	}

	fn new_with_iter_capacity(worker_threads: usize, default_iter_capacity: usize) -> Self {
		Tree {
			shared: Arc::new(TreeShared {
				pool: Arc::new(WorkerPool::new(worker_threads)),
				inner: Mutex::new(TreeInner {
					lifecycle: Lifecycle::new(),
					engine: None,
					prefix: String::new(),
					children: DList::new(),
					close_waiters: Vec::new(),
					default_iter_capacity,
				}),
			}),
		}
	}

	/// A fresh tree built from `StoreOptions`; `open` still takes its own
	/// `prefix` so the same options can be reused across directories.
	/// Transactions opened from it default their iterators to
	/// `opts.iterator.cache_capacity` unless overridden at the call site.
	pub fn with_options(opts: &StoreOptions) -> Self {
		Self::new_with_iter_capacity(opts.worker_threads, opts.iterator.cache_capacity)
	}

	pub fn state(&self) -> HandleState {
		self.shared.inner.lock().lifecycle.state()
	}

	/// Opens (or creates) the tree directory at `prefix`. Resolves with the
	/// engine-reported current root on success.
	pub async fn open(&self, prefix: impl Into<String>) -> Result<Hash, CoreError> {
		let prefix = prefix.into();
		{
			let mut inner = self.shared.inner.lock();
			inner.lifecycle.begin_open()?;
			inner.prefix = prefix.clone();
		}
		let pool = self.shared.pool.clone();
		let opened = pool.schedule(move || E::open(&prefix)).await;
		let mut inner = self.shared.inner.lock();
		match opened {
			Ok(engine) => {
				let root = engine.root();
				inner.engine = Some(Arc::new(engine));
				inner.lifecycle.open_succeeded();
				drop(inner);
				log::debug!(target: "urkel", "tree opened at root {root}");
				self.pump().await;
				Ok(root)
			}
			Err(e) => {
				inner.lifecycle.open_failed();
				drop(inner);
				log::warn!(target: "urkel", "tree open failed: {e}");
				self.pump().await;
				Err(e.into())
			}
		}
	}

	/// Opens at the prefix carried by `opts` (see [`Tree::with_options`]).
	pub async fn open_with(&self, opts: &StoreOptions) -> Result<Hash, CoreError> {
		self.open(opts.prefix.clone()).await
	}

	/// Synchronous variant, for callers on a thread where suspending isn't
	/// wanted. Runs the engine call inline (spec §5).
	pub fn open_sync(&self, prefix: impl Into<String>) -> Result<Hash, CoreError> {
		let prefix = prefix.into();
		{
			let mut inner = self.shared.inner.lock();
			inner.lifecycle.begin_open()?;
			inner.prefix = prefix.clone();
		}
		let opened = E::open(&prefix);
		let mut inner = self.shared.inner.lock();
		match opened {
			Ok(engine) => {
				let root = engine.root();
				inner.engine = Some(Arc::new(engine));
				inner.lifecycle.open_succeeded();
				Ok(root)
			}
			Err(e) => {
				inner.lifecycle.open_failed();
				Err(e.into())
			}
		}
	}

	/// Requests a close; resolves once the tree and every descendant
	/// transaction/iterator has finalized. Multiple concurrent calls all
	/// resolve together and never fail (spec §4.3).
	pub async fn close(&self) {
		let rx = {
			let mut inner = self.shared.inner.lock();
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
		self.pump().await;
		if let Some(rx) = rx {
			let _ = rx.await;
		}
	}

	pub fn is_close_queued(&self) -> bool {
		self.shared.inner.lock().lifecycle.is_close_queued()
	}

	pub(crate) fn engine(&self) -> Result<Arc<E>, CoreError> {
		let inner = self.shared.inner.lock();
		match ready_err(inner.lifecycle.ready()) {
			Some(e) => Err(e),
			None => Ok(inner.engine.clone().expect("invariant I1: engine present while Open")),
		}
	}

	pub fn root_hash(&self) -> Result<Hash, CoreError> {
		Ok(self.engine()?.root())
	}

	pub async fn get(&self, key: Hash) -> Result<Option<Value>, CoreError> {
		let engine = self.engine()?;
		let root = engine.root();
		let pool = self.shared.pool.clone();
		Ok(pool.schedule(move || engine.get(root, &key)).await?)
	}

	pub fn get_sync(&self, key: Hash) -> Result<Option<Value>, CoreError> {
		let engine = self.engine()?;
		let root = engine.root();
		Ok(engine.get(root, &key)?)
	}

	pub async fn has(&self, key: Hash) -> Result<bool, CoreError> {
		Ok(self.get(key).await?.is_some())
	}

	pub async fn prove(&self, key: Hash) -> Result<Proof, CoreError> {
		let engine = self.engine()?;
		let root = engine.root();
		let pool = self.shared.pool.clone();
		Ok(pool.schedule(move || engine.prove(root, &key)).await?)
	}

	/// Switches the tree's view to a historical root. Fails `NotFound` if
	/// the engine cannot serve reads at that root (spec §4.3).
	pub async fn inject(&self, root: Hash) -> Result<(), CoreError> {
		let engine = self.engine()?;
		let pool = self.shared.pool.clone();
		pool.schedule(move || engine.check_root(root)).await?;
		// The tree itself does not cache a distinct "current view" root
		// separate from the engine's own notion of root (invariant I3);
		// injecting at the tree level is exposed through transactions,
		// which pin their own root. This validates the root is known and
		// is the operation a caller uses before opening a snapshot there.
		Ok(())
	}

	pub async fn compact(&self, tmp_prefix: impl Into<String>, root: Option<Hash>) -> Result<(), CoreError> {
		let engine = self.engine()?;
		let root = root.unwrap_or_else(|| engine.root());
		let tmp_prefix = tmp_prefix.into();
		let pool = self.shared.pool.clone();
		Ok(pool.schedule(move || engine.compact(&tmp_prefix, root)).await?)
	}

	pub fn verify(root: Hash, key: &Hash, proof: &Proof) -> (urkel_primitives::VerifyCode, Option<Value>) {
		E::verify(root, key, proof)
	}

	pub async fn destroy(prefix: impl Into<String>) -> Result<(), CoreError> {
		let prefix = prefix.into();
		log::info!(target: "urkel", "destroying tree at {prefix}");
		Ok(E::destroy(&prefix)?)
	}

	pub async fn stat(prefix: impl Into<String>) -> Result<StoreStat, CoreError> {
		let prefix = prefix.into();
		Ok(E::stat(&prefix)?)
	}

	/// Opens a read-only snapshot pinned at `init_root` (or the tree's
	/// current root if `None`).
	pub async fn snapshot(&self, init_root: Option<Hash>) -> Result<Transaction<E>, CoreError> {
		Transaction::open(self, TxKind::Snapshot, init_root).await
	}

	/// Opens a read/write batch pinned at the tree's current root.
	pub async fn transaction(&self) -> Result<Transaction<E>, CoreError> {
		Transaction::open(self, TxKind::Batch, None).await
	}

	/// Opens a virtual batch: a batch that buffers writes and flushes
	/// lazily (spec §4.5).
	pub async fn vbatch(&self) -> Result<Transaction<E>, CoreError> {
		Transaction::open(self, TxKind::VirtualBatch(crate::vbatch::VBatch::new()), None).await
	}

	pub(crate) fn register_tx(&self, shared: Arc<TxShared<E>>) -> Token {
		self.shared.inner.lock().children.insert(shared)
	}

	pub(crate) fn unregister_tx(&self, token: Token) {
		self.shared.inner.lock().children.remove(token);
	}

	pub(crate) fn engine_handle(&self) -> Option<Arc<E>> {
		self.shared.inner.lock().engine.clone()
	}

	pub(crate) fn default_iter_capacity(&self) -> usize {
		self.shared.inner.lock().default_iter_capacity
	}

	pub fn debug_info(&self, expand_tx: bool, expand_iter: bool) -> crate::debug::TreeDebugInfo {
		let inner = self.shared.inner.lock();
		let txs: Vec<_> = if expand_tx {
			inner.children.iter().map(|tx| tx_debug(tx, expand_iter)).collect()
		} else {
			Vec::new()
		};
		crate::debug::TreeDebugInfo {
			workers: inner.lifecycle.workers_in_flight(),
			txs: inner.children.len(),
			state: crate::debug::state_name(inner.lifecycle.state()),
			is_close_queued: inner.lifecycle.is_close_queued(),
			is_tx_close_queued: inner.children.iter().any(|tx| tx.inner.lock().is_close_queued()),
			transactions: txs,
		}
	}

	/// The final-check driver loop. Repeatedly evaluates `final_check` and
	/// carries out whatever it reports, until quiescent (spec §4.1: this
	/// must run after every event that could satisfy its preconditions).
	pub(crate) async fn pump(&self) {
		loop {
			let action = {
				let mut inner = self.shared.inner.lock();
				let children_len = inner.children.len();
				inner.lifecycle.final_check(children_len)
			};
			match action {
				FinalAction::None => break,
				FinalAction::CloseChildren => {
					let children: Vec<Arc<TxShared<E>>> = {
						let inner = self.shared.inner.lock();
						inner.children.iter().cloned().collect()
					};
					let closes: Vec<_> = children
						.into_iter()
						.map(|shared| Transaction::close_shared(shared))
						.collect();
					futures::future::join_all(closes).await;
				}
				FinalAction::RunClose => {
					let engine = { self.shared.inner.lock().engine.take() };
					if let Some(engine) = engine {
						let pool = self.shared.pool.clone();
						let owned = Arc::try_unwrap(engine).unwrap_or_else(|_| {
							panic!("urkel-store: engine still referenced by a child transaction at tree close")
						});
						pool.schedule(move || owned.close()).await;
					}
					let mut inner = self.shared.inner.lock();
					inner.lifecycle.close_completed();
					let waiters: Vec<_> = inner.close_waiters.drain(..).collect();
					drop(inner);
					log::debug!(target: "urkel", "tree closed");
					for w in waiters {
						let _ = w.send(());
					}
				}
				FinalAction::Cleanup => break,
			}
		}
	}
}

fn tx_debug<E: Engine>(tx: &Arc<TxShared<E>>, expand_iter: bool) -> crate::debug::TxDebugInfo {
	let inner = tx.inner.lock();
	let iters: Vec<_> = if expand_iter {
		inner.children_debug()
	} else {
		Vec::new()
	};
	crate::debug::TxDebugInfo {
		workers: inner.workers_in_flight(),
		iters: inner.children_len(),
		state: crate::debug::state_name(inner.lifecycle_state()),
		is_close_queued: inner.is_close_queued(),
		is_iter_close_queued: inner.any_iter_close_queued(),
		iterators: iters,
	}
}

