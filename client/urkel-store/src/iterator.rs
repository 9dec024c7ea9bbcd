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

//! The Iter component (spec §4.6): a forward cursor whose view is fixed as
//! of `open` (invariant I7) and which allows at most one `next` in flight
//! (invariant I6) — a `close` issued mid-`next` is queued and only carried
//! out once that `next` completes and runs its own final-check.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::Mutex;

use urkel_primitives::{Engine, Hash, Value};

use crate::debug::IterDebugInfo;
use crate::dlist::Token;
use crate::error::CoreError;
use crate::lifecycle::{ready_err, FinalAction, HandleState, Lifecycle};
use crate::transaction::Transaction;
use crate::worker::WorkerPool;

pub(crate) struct IterShared<E: Engine> {
	pool: Arc<WorkerPool>,
	pub(crate) inner: Mutex<IterInner<E>>,
}

pub(crate) struct IterInner<E: Engine> {
	lifecycle: Lifecycle,
	/// The pin: strong reference back to the parent transaction, released
	/// only at `FinalAction::Cleanup`.
	tx: Option<Transaction<E>>,
	tx_token: Option<Token>,
	engine: Option<Arc<E>>,
	handle: Option<E::IterHandle>,
	cache_capacity: usize,
	buffer: VecDeque<(Hash, Value)>,
	nexting: bool,
	close_waiters: Vec<oneshot::Sender<()>>,
}

impl<E: Engine> IterInner<E> {
	pub(crate) fn is_close_queued(&self) -> bool {
		self.lifecycle.is_close_queued()
	}

	pub(crate) fn debug_info(&self) -> IterDebugInfo {
		IterDebugInfo {
			nexting: self.nexting,
			state: crate::debug::state_name(self.lifecycle.state()),
			is_close_queued: self.lifecycle.is_close_queued(),
			cache_max_size: self.cache_capacity,
			cache_size: self.buffer.len(),
			buffer_size: self.buffer.len(),
		}
	}
}

/// A handle to an open (or not-yet-open) forward cursor. Cheap to clone.
pub struct Iter<E: Engine> {
	shared: Arc<IterShared<E>>,
}

impl<E: Engine> Clone for Iter<E> {
	fn clone(&self) -> Self {
		Iter {
			shared: self.shared.clone(),
		}
	}
}

/// See `Tree`'s `Drop` impl: an iterator has no children of its own, so
/// `request_cleanup` is always called with `has_children = false`.
impl<E: Engine> Drop for Iter<E> {
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
					inner.lifecycle.request_cleanup(false);
					true
				}
			}
			None => false,
		};
		if should_pump {
			let pool = shared.pool.clone();
			pool.spawn_detached(move || {
				futures::executor::block_on(Iter { shared }.pump());
			});
		}
	}
}

impl<E: Engine> Iter<E> {
	pub(crate) async fn open(tx: &Transaction<E>, cache_capacity: usize) -> Result<Iter<E>, CoreError> {
		let engine = tx.engine_handle()?;
		let tx_handle = tx.tx_handle_copy();
		let pool = tx.pool();
		let shared = Arc::new(IterShared {
			pool: pool.clone(),
			inner: Mutex::new(IterInner {
				lifecycle: Lifecycle::new(),
				tx: Some(tx.clone()),
				tx_token: None,
				engine: None,
				handle: None,
				cache_capacity: cache_capacity.max(1),
				buffer: VecDeque::new(),
				nexting: false,
				close_waiters: Vec::new(),
			}),
		});
		let token = tx.register_iter(shared.clone());
		{
			let mut inner = shared.inner.lock();
			inner.tx_token = Some(token);
			inner
				.lifecycle
				.begin_open()
				.expect("freshly constructed iterator lifecycle is Closed");
		}
		let handle = pool
			.schedule({
				let engine = engine.clone();
				move || engine.iter_open(&tx_handle)
			})
			.await;
		let mut inner = shared.inner.lock();
		inner.engine = Some(engine);
		inner.handle = Some(handle);
		inner.lifecycle.open_succeeded();
		drop(inner);
		Ok(Iter { shared })
	}

	pub fn state(&self) -> HandleState {
		self.shared.inner.lock().lifecycle.state()
	}

	pub async fn close(&self) {
		Self::close_shared(self.shared.clone()).await
	}

	pub(crate) async fn close_shared(shared: Arc<IterShared<E>>) {
		let rx = {
			let mut inner = shared.inner.lock();
			if inner.lifecycle.state() == HandleState::Closed {
				None
			} else {
				let (tx, rx) = oneshot::channel();
				inner.close_waiters.push(tx);
				// An iterator never has children of its own.
				inner.lifecycle.request_close(false);
				Some(rx)
			}
		};
		Self::pump(&shared).await;
		if let Some(rx) = rx {
			let _ = rx.await;
		}
	}

	/// Advances the cursor, fetching more entries from the engine when the
	/// local buffer runs dry. `Ok(None)` signals end-of-iteration.
	pub async fn next(&self) -> Result<Option<(Hash, Value)>, CoreError> {
		{
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			if let Some(item) = inner.buffer.pop_front() {
				return Ok(Some(item));
			}
		}
		self.fill().await?;
		let mut inner = self.shared.inner.lock();
		Ok(inner.buffer.pop_front())
	}

	async fn fill(&self) -> Result<(), CoreError> {
		let (engine, handle, max) = {
			let mut inner = self.shared.inner.lock();
			if let Some(err) = ready_err(inner.lifecycle.ready()) {
				return Err(err);
			}
			let engine = inner.engine.clone().expect("engine present while Open");
			let handle = inner.handle.take().expect("handle present while Open");
			inner.nexting = true;
			inner.lifecycle.begin_worker();
			(engine, handle, inner.cache_capacity)
		};
		let pool = self.shared.pool.clone();
		let (engine, handle, result) = pool
			.schedule(move || {
				let mut handle = handle;
				let r = engine.iter_next_batch(&mut handle, max);
				(engine, handle, r)
			})
			.await;
		let mut inner = self.shared.inner.lock();
		inner.engine = Some(engine);
		inner.handle = Some(handle);
		inner.nexting = false;
		inner.lifecycle.end_worker();
		let result = result.map(|batch| {
			inner.buffer.extend(batch);
		});
		drop(inner);
		// The queued close (if any) can only run now that `nexting` has
		// cleared; a fresh final-check is exactly that signal.
		self.pump().await;
		result.map_err(CoreError::from)
	}

	async fn pump(&self) {
		loop {
			let action = {
				let mut inner = self.shared.inner.lock();
				inner.lifecycle.final_check(0)
			};
			match action {
				FinalAction::None => break,
				FinalAction::CloseChildren => continue,
				FinalAction::RunClose => {
					let (engine, handle) = {
						let mut inner = self.shared.inner.lock();
						(inner.engine.take(), inner.handle.take())
					};
					if let (Some(engine), Some(handle)) = (engine, handle) {
						let pool = self.shared.pool.clone();
						pool.schedule(move || engine.iter_close(handle)).await;
					}
					let mut inner = self.shared.inner.lock();
					inner.lifecycle.close_completed();
					let waiters: Vec<_> = inner.close_waiters.drain(..).collect();
					drop(inner);
					for w in waiters {
						let _ = w.send(());
					}
				}
				FinalAction::Cleanup => {
					let (tx, token) = {
						let mut inner = self.shared.inner.lock();
						(inner.tx.take(), inner.tx_token.take())
					};
					if let (Some(tx), Some(token)) = (tx, token) {
						tx.unregister_iter(token);
						Transaction::pump_shared(&tx.shared).await;
					}
					break;
				}
			}
		}
	}
}
