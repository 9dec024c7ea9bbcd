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

//! Core error taxonomy layered above the engine's own numeric errno
//! (spec §4.8). `EngineError` values pass through with their numeric code
//! and symbolic name attached; `CoreError` covers the lifecycle failures
//! that only make sense at this layer (a handle that isn't open yet, a
//! batch that hasn't flushed its virtual buffer, and so on).

use urkel_primitives::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
	#[error("handle is already open")]
	AlreadyOpen,
	#[error("handle is already closed")]
	AlreadyClosed,
	#[error("handle is still opening")]
	Opening,
	#[error("handle is closing")]
	Closing,
	#[error("handle was never opened")]
	NotInitialized,
	#[error("transaction is already open")]
	TxAlreadyOpen,
	#[error("transaction is not open")]
	TxNotOpen,
	#[error("virtual batch has unflushed operations")]
	TxNotFlushed,
	#[error("iterator is not open")]
	IterNotOpen,
	#[error("allocation failed")]
	Alloc,
	#[error("proof encoding error")]
	Encoding,
	#[error(transparent)]
	Engine(#[from] EngineError),
}

impl CoreError {
	/// The symbolic name a structured failure reports to the caller,
	/// matching spec §7's "code (symbolic name) and message" shape.
	pub fn code(&self) -> &'static str {
		match self {
			CoreError::AlreadyOpen => "ALREADY_OPEN",
			CoreError::AlreadyClosed => "ALREADY_CLOSED",
			CoreError::Opening => "OPENING",
			CoreError::Closing => "CLOSING",
			CoreError::NotInitialized => "NOT_INITIALIZED",
			CoreError::TxAlreadyOpen => "TX_ALREADY_OPEN",
			CoreError::TxNotOpen => "TX_NOT_OPEN",
			CoreError::TxNotFlushed => "TX_NOT_FLUSHED",
			CoreError::IterNotOpen => "ITER_NOT_OPEN",
			CoreError::Alloc => "ALLOC",
			CoreError::Encoding => "ENCODING",
			CoreError::Engine(e) => e.name(),
		}
	}
}

/// A structured failure as seen by a surface-API caller: a stable symbolic
/// code plus a human-readable message (spec §7 point 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
	pub code: &'static str,
	pub message: String,
}

impl From<CoreError> for Failure {
	fn from(e: CoreError) -> Self {
		Failure {
			code: e.code(),
			message: e.to_string(),
		}
	}
}

impl std::fmt::Display for Failure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.code, self.message)
	}
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn engine_error_keeps_its_symbolic_name() {
		let e: CoreError = EngineError::NotFound.into();
		assert_eq!(e.code(), "NOTFOUND");
	}

	#[test]
	fn failure_display_includes_code_and_message() {
		let f: Failure = CoreError::TxNotFlushed.into();
		assert_eq!(f.code, "TX_NOT_FLUSHED");
		assert!(f.to_string().contains("TX_NOT_FLUSHED"));
	}
}
