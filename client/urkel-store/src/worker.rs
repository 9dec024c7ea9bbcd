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

//! The worker pool adapter (spec §4.2): `schedule` runs a blocking unit of
//! work on a pool thread and delivers its output exactly once to the
//! caller's scheduler, via `futures::channel::oneshot` — the same
//! one-shot-result pattern `client/network/src/request_responses.rs` uses
//! for `pending_requests`. There is no mid-work cancellation; once
//! scheduled, `work` always runs to completion.

use futures::channel::oneshot;

/// A scheduled unit of blocking work resolved exactly once. Awaiting it is
/// the one suspension point spec §5 describes; a `Canceled` (the pool
/// thread panicked without sending) surfaces as a programming-error panic
/// rather than a recoverable failure, since that can only happen if the
/// work closure itself panicked.
pub struct WorkerPool {
	pool: threadpool::ThreadPool,
}

impl WorkerPool {
	pub fn new(num_threads: usize) -> Self {
		WorkerPool {
			pool: threadpool::ThreadPool::new(num_threads.max(1)),
		}
	}

	/// Runs `work` on a pool thread and returns a future that resolves to
	/// its output. `work` must not touch the caller's scheduler; it may
	/// block on disk I/O.
	pub fn schedule<F, T>(&self, work: F) -> impl std::future::Future<Output = T>
	where
		F: FnOnce() -> T + Send + 'static,
		T: Send + 'static,
	{
		let (tx, rx) = oneshot::channel();
		self.pool.execute(move || {
			let result = work();
			// The receiver may already be gone if the caller dropped the
			// future (e.g. the whole runtime shut down); that is not a
			// programming error on this side.
			let _ = tx.send(result);
		});
		async move { rx.await.expect("worker pool thread panicked before sending a result") }
	}

	/// Runs `work` on a pool thread without a result; used by an owner
	/// drop to hand its final-check/close off the caller's thread, since
	/// `Drop::drop` cannot await `schedule`'s future itself.
	pub fn spawn_detached<F>(&self, work: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.pool.execute(work);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schedule_runs_work_and_delivers_result() {
		let pool = WorkerPool::new(1);
		let fut = pool.schedule(|| 2 + 2);
		let result = futures::executor::block_on(fut);
		assert_eq!(result, 4);
	}

	#[test]
	fn schedule_many_all_complete() {
		let pool = WorkerPool::new(4);
		let futs: Vec<_> = (0..16).map(|i| pool.schedule(move || i * i)).collect();
		let results = futures::executor::block_on(futures::future::join_all(futs));
		assert_eq!(results, (0..16).map(|i| i * i).collect::<Vec<_>>());
	}
}
