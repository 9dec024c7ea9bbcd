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

//! The handle state machine and final-check protocol shared by `Tree`,
//! `Transaction`, and `Iter` (spec §4.1). The three close-queue flags
//! (`must_close_children`, `pending_close`, `must_cleanup`) stay distinct
//! fields on purpose — they encode different races (an in-flight worker
//! racing a close request, a close request racing a child registering, an
//! owner drop racing a late worker completion) and collapsing them loses
//! the ability to tell those races apart.

use crate::error::CoreError;

/// Shared by `Tree`, `Transaction`, and `Iter`'s op guards: what a `Ready`
/// probe means for a caller about to start an operation.
pub(crate) fn ready_err(ready: Ready) -> Option<CoreError> {
	match ready {
		Ready::Ok => None,
		Ready::Opening => Some(CoreError::Opening),
		Ready::Closing => Some(CoreError::Closing),
		Ready::Closed => Some(CoreError::NotInitialized),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
	Closed,
	Opening,
	Open,
	Closing,
}

/// What a caller should be told when probing a handle before starting an
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
	Ok,
	Opening,
	Closing,
	Closed,
}

/// What the final-check algorithm decided the caller must now do. Exactly
/// one of these is returned per call; the caller (which alone knows its
/// concrete child type and close worker) carries out the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalAction {
	/// Nothing is safe to do yet.
	None,
	/// Enqueue a close on every child, then call `final_check` again.
	CloseChildren,
	/// Dispatch the close worker; state is already `Closing`.
	RunClose,
	/// Workers are drained, no children remain, and there is nothing left
	/// to close: free this handle's resources.
	Cleanup,
}

/// The state + close-queue flags. Contains no knowledge of children or of
/// what a close worker actually does — that lives on the owning entity.
pub struct Lifecycle {
	state: HandleState,
	workers_in_flight: u32,
	pending_close: bool,
	must_close_children: bool,
	must_cleanup: bool,
}

impl Lifecycle {
	pub fn new() -> Self {
		Lifecycle {
			state: HandleState::Closed,
			workers_in_flight: 0,
			pending_close: false,
			must_close_children: false,
			must_cleanup: false,
		}
	}

	pub fn state(&self) -> HandleState {
		self.state
	}

	pub fn ready(&self) -> Ready {
		match self.state {
			HandleState::Open => Ready::Ok,
			HandleState::Opening => Ready::Opening,
			HandleState::Closing => Ready::Closing,
			HandleState::Closed => Ready::Closed,
		}
	}

	pub fn is_close_queued(&self) -> bool {
		self.pending_close
	}

	pub fn workers_in_flight(&self) -> u32 {
		self.workers_in_flight
	}

	/// `open` is rejected unless state is exactly `Closed` (spec §3).
	pub fn begin_open(&mut self) -> Result<(), CoreError> {
		match self.state {
			HandleState::Closed => {
				self.state = HandleState::Opening;
				self.workers_in_flight += 1;
				Ok(())
			}
			HandleState::Opening => Err(CoreError::Opening),
			HandleState::Open => Err(CoreError::AlreadyOpen),
			HandleState::Closing => Err(CoreError::Closing),
		}
	}

	pub fn open_succeeded(&mut self) {
		debug_assert_eq!(self.state, HandleState::Opening);
		self.state = HandleState::Open;
		self.end_worker_count();
	}

	pub fn open_failed(&mut self) {
		debug_assert_eq!(self.state, HandleState::Opening);
		self.state = HandleState::Closed;
		self.end_worker_count();
	}

	pub fn begin_worker(&mut self) {
		self.workers_in_flight += 1;
	}

	pub fn end_worker(&mut self) {
		self.end_worker_count();
	}

	fn end_worker_count(&mut self) {
		assert!(self.workers_in_flight > 0, "worker count underflow");
		self.workers_in_flight -= 1;
	}

	/// Records that a close has been requested. `has_children` tells the
	/// state machine whether `must_close_children` needs to be raised; the
	/// caller is the only one who knows its own child list's size.
	pub fn request_close(&mut self, has_children: bool) {
		self.pending_close = true;
		if has_children {
			self.must_close_children = true;
		}
	}

	/// Records that the owner dropped the handle without an explicit
	/// close. Non-blocking by construction: it only ever flips a flag.
	pub fn request_cleanup(&mut self, has_children: bool) {
		self.request_close(has_children);
		self.must_cleanup = true;
	}

	/// The final-check algorithm, spec §4.1. Must be invoked after any
	/// event that could satisfy its preconditions: a worker completing, a
	/// close request, a child unregistering, or an owner drop.
	pub fn final_check(&mut self, children_len: usize) -> FinalAction {
		if self.workers_in_flight > 0 {
			return FinalAction::None;
		}
		if self.must_close_children {
			self.must_close_children = false;
			return FinalAction::CloseChildren;
		}
		if children_len > 0 {
			return FinalAction::None;
		}
		if self.pending_close && self.state != HandleState::Closing {
			self.state = HandleState::Closing;
			self.workers_in_flight += 1;
			return FinalAction::RunClose;
		}
		if self.must_cleanup {
			self.must_cleanup = false;
			return FinalAction::Cleanup;
		}
		FinalAction::None
	}

	pub fn close_completed(&mut self) {
		self.state = HandleState::Closed;
		self.end_worker_count();
		self.pending_close = false;
	}
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn open_is_rejected_unless_closed() {
		let mut l = Lifecycle::new();
		l.begin_open().unwrap();
		assert_eq!(l.begin_open().unwrap_err(), CoreError::Opening);
		l.open_succeeded();
		assert_eq!(l.begin_open().unwrap_err(), CoreError::AlreadyOpen);
	}

	#[test]
	fn final_check_waits_for_workers_before_closing() {
		let mut l = Lifecycle::new();
		l.begin_open().unwrap();
		l.open_succeeded();
		l.begin_worker();
		l.request_close(false);
		assert_eq!(l.final_check(0), FinalAction::None);
		l.end_worker();
		assert_eq!(l.final_check(0), FinalAction::RunClose);
	}

	#[test]
	fn final_check_closes_children_before_self() {
		let mut l = Lifecycle::new();
		l.begin_open().unwrap();
		l.open_succeeded();
		l.request_close(true);
		assert_eq!(l.final_check(1), FinalAction::CloseChildren);
		// children still present: waits.
		assert_eq!(l.final_check(1), FinalAction::None);
		// once children drain, close proceeds.
		assert_eq!(l.final_check(0), FinalAction::RunClose);
	}

	#[test]
	fn cleanup_only_fires_once_quiescent() {
		let mut l = Lifecycle::new();
		l.begin_open().unwrap();
		l.open_succeeded();
		l.begin_worker();
		l.request_cleanup(false);
		assert_eq!(l.final_check(0), FinalAction::None);
		l.end_worker();
		assert_eq!(l.final_check(0), FinalAction::RunClose);
		l.close_completed();
		assert_eq!(l.final_check(0), FinalAction::Cleanup);
	}
}
