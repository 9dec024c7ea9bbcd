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

use urkel_primitives::{Hash, Value};

/// An engine-level transaction: a root plus, for a batch, nothing extra —
/// buffered writes are applied directly against the shared node map as they
/// arrive, so the handle itself only needs to remember which root it is
/// currently pinned at.
#[derive(Debug, Clone, Copy)]
pub struct TxHandle {
	pub root: Hash,
}

/// A materialized forward cursor. Both backends collect the full ordered
/// key set at `iter_open` time (spec.md invariant I7: the view is fixed as
/// of that call) and then hand out slices of it on each `iter_next_batch`.
pub struct IterHandle {
	pub items: Vec<(Hash, Value)>,
	pub pos: usize,
}
