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

//! Read-only snapshot of a tree's handle state, for tests (spec §6 "Debug
//! surface"). Backed by `serde::Serialize` the way the teacher's own
//! diagnostic structures are (e.g. `client/tracing`'s span data), even
//! though the only consumer today is a test asserting on the shape.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TreeDebugInfo {
	pub workers: u32,
	pub txs: usize,
	pub state: &'static str,
	pub is_close_queued: bool,
	pub is_tx_close_queued: bool,
	pub transactions: Vec<TxDebugInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxDebugInfo {
	pub workers: u32,
	pub iters: usize,
	pub state: &'static str,
	pub is_close_queued: bool,
	pub is_iter_close_queued: bool,
	pub iterators: Vec<IterDebugInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterDebugInfo {
	pub nexting: bool,
	pub state: &'static str,
	pub is_close_queued: bool,
	pub cache_max_size: usize,
	pub cache_size: usize,
	pub buffer_size: usize,
}

impl TreeDebugInfo {
	pub fn to_json(&self) -> String {
		serde_json::to_string(self).expect("debug info is always representable as JSON")
	}
}

pub(crate) fn state_name(state: crate::lifecycle::HandleState) -> &'static str {
	use crate::lifecycle::HandleState::*;
	match state {
		Closed => "Closed",
		Opening => "Opening",
		Open => "Open",
		Closing => "Closing",
	}
}
