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

/// Errors surfaced by the trie engine, numbered the way the on-disk format's
/// own errno convention numbers them (1..13). The numeric code travels with
/// the symbolic name so a caller can log either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
	#[error("hash mismatch")]
	HashMismatch,
	#[error("same key")]
	SameKey,
	#[error("same path")]
	SamePath,
	#[error("negative depth")]
	NegDepth,
	#[error("path mismatch")]
	PathMismatch,
	#[error("trie too deep")]
	TooDeep,
	#[error("invalid input")]
	Inval,
	#[error("not found")]
	NotFound,
	#[error("corruption")]
	Corruption,
	#[error("no update")]
	NoUpdate,
	#[error("bad write")]
	BadWrite,
	#[error("bad open")]
	BadOpen,
	#[error("iterator end")]
	IterEnd,
}

impl EngineError {
	/// The engine's own numeric errno, 1..13, matching the order in spec.md §4.8.
	pub const fn code(self) -> i32 {
		match self {
			EngineError::HashMismatch => 1,
			EngineError::SameKey => 2,
			EngineError::SamePath => 3,
			EngineError::NegDepth => 4,
			EngineError::PathMismatch => 5,
			EngineError::TooDeep => 6,
			EngineError::Inval => 7,
			EngineError::NotFound => 8,
			EngineError::Corruption => 9,
			EngineError::NoUpdate => 10,
			EngineError::BadWrite => 11,
			EngineError::BadOpen => 12,
			EngineError::IterEnd => 13,
		}
	}

	/// The symbolic name, as it should appear in a structured failure.
	pub const fn name(self) -> &'static str {
		match self {
			EngineError::HashMismatch => "HASHMISMATCH",
			EngineError::SameKey => "SAMEKEY",
			EngineError::SamePath => "SAMEPATH",
			EngineError::NegDepth => "NEGDEPTH",
			EngineError::PathMismatch => "PATHMISMATCH",
			EngineError::TooDeep => "TOODEEP",
			EngineError::Inval => "INVAL",
			EngineError::NotFound => "NOTFOUND",
			EngineError::Corruption => "CORRUPTION",
			EngineError::NoUpdate => "NOUPDATE",
			EngineError::BadWrite => "BADWRITE",
			EngineError::BadOpen => "BADOPEN",
			EngineError::IterEnd => "ITEREND",
		}
	}

	pub const fn from_code(code: i32) -> Option<Self> {
		Some(match code {
			1 => EngineError::HashMismatch,
			2 => EngineError::SameKey,
			3 => EngineError::SamePath,
			4 => EngineError::NegDepth,
			5 => EngineError::PathMismatch,
			6 => EngineError::TooDeep,
			7 => EngineError::Inval,
			8 => EngineError::NotFound,
			9 => EngineError::Corruption,
			10 => EngineError::NoUpdate,
			11 => EngineError::BadWrite,
			12 => EngineError::BadOpen,
			13 => EngineError::IterEnd,
			_ => return None,
		})
	}
}

/// The outcome of [`crate::engine::Engine::verify`]: either the proof checked
/// out (with or without an accompanying leaf value) or it failed for a
/// specific, never-panicking reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyCode {
	/// The proof is internally consistent with the given root and key.
	Ok,
	/// The proof (or the key presented against it) failed verification.
	Failed(EngineError),
}

impl VerifyCode {
	pub fn name(self) -> &'static str {
		match self {
			VerifyCode::Ok => "OK",
			VerifyCode::Failed(e) => e.name(),
		}
	}
}

impl std::fmt::Display for VerifyCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn code_round_trips() {
		for code in 1..=13 {
			let err = EngineError::from_code(code).unwrap();
			assert_eq!(err.code(), code);
		}
	}

	#[test]
	fn unknown_code_is_none() {
		assert!(EngineError::from_code(0).is_none());
		assert!(EngineError::from_code(14).is_none());
	}
}
