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

use once_cell::sync::OnceCell;

use crate::error::EngineError;

/// Upper bound on an encoded proof, per spec.md §3: the deepest possible
/// Urkel proof (256 levels) plus a leaf/collision record and framing.
pub const MAX_PROOF_SIZE: usize = 17957;

/// The shape of proof a verifier is holding, encoded as the first byte of
/// the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofType {
	/// The path ended at an empty subtree: proof of non-existence.
	DeadEnd,
	/// The path ended above depth 256 at a leaf for a different key sharing
	/// a path prefix: proof of non-existence.
	Short,
	/// The path ended at a leaf whose full key hash collides with the
	/// queried key's prefix but the keys differ: proof of non-existence,
	/// one specific failure shape.
	Collision,
	/// The path ended at a leaf for exactly the queried key: proof of
	/// existence, carries the leaf value.
	Exists,
	/// The trailing byte did not match any known tag. Only produced by
	/// [`Proof::kind`] on malformed input; never written by an encoder.
	Unknown,
}

impl ProofType {
	const fn tag(self) -> u8 {
		match self {
			ProofType::DeadEnd => 0,
			ProofType::Short => 1,
			ProofType::Collision => 2,
			ProofType::Exists => 3,
			ProofType::Unknown => 255,
		}
	}

	const fn from_tag(tag: u8) -> Self {
		match tag {
			0 => ProofType::DeadEnd,
			1 => ProofType::Short,
			2 => ProofType::Collision,
			3 => ProofType::Exists,
			_ => ProofType::Unknown,
		}
	}
}

/// An opaque, already-encoded proof buffer. The header (type tag) is parsed
/// lazily and cached on first access, per spec.md §4.7; the byte payload
/// itself is never decoded further by this crate, only by the engine that
/// produced it or the verifier that checks it.
#[derive(Clone)]
pub struct Proof {
	bytes: Vec<u8>,
	kind: OnceCell<ProofType>,
}

/// The proof buffer is empty, or larger than [`MAX_PROOF_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed proof encoding")]
pub struct ProofEncodingError;

impl Proof {
	/// Builds a proof from an already-encoded byte buffer. The first byte
	/// must be one of the known type tags, or later [`Proof::kind`] calls
	/// report [`ProofType::Unknown`] rather than failing here; only size is
	/// validated eagerly.
	pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ProofEncodingError> {
		if bytes.is_empty() || bytes.len() > MAX_PROOF_SIZE {
			return Err(ProofEncodingError);
		}
		Ok(Proof {
			bytes,
			kind: OnceCell::new(),
		})
	}

	pub(crate) fn encode(kind: ProofType, mut payload: Vec<u8>) -> Self {
		let mut bytes = Vec::with_capacity(payload.len() + 1);
		bytes.push(kind.tag());
		bytes.append(&mut payload);
		let cell = OnceCell::new();
		let _ = cell.set(kind);
		Proof { bytes, kind: cell }
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.bytes
	}

	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	/// The decoded type tag, parsed once and cached. Never panics on
	/// malformed bytes — an unrecognized tag decodes to
	/// [`ProofType::Unknown`] rather than erroring, matching spec.md §4.7's
	/// "never throws" requirement for verification paths that call this.
	pub fn kind(&self) -> ProofType {
		*self.kind.get_or_init(|| {
			let tag = self.bytes.first().copied().unwrap_or(255);
			ProofType::from_tag(tag)
		})
	}

	/// The payload after the type tag, for the engine that encoded it to
	/// reinterpret.
	pub fn payload(&self) -> &[u8] {
		&self.bytes[1..]
	}
}

impl std::fmt::Debug for Proof {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Proof")
			.field("kind", &self.kind())
			.field("len", &self.bytes.len())
			.finish()
	}
}

/// Translate a proof-encoding failure into the core error taxonomy's
/// `ENCODING` bucket at the boundary where this crate's callers need an
/// `EngineError`-shaped value (parsing never fails with an engine errno of
/// its own).
impl From<ProofEncodingError> for EngineError {
	fn from(_: ProofEncodingError) -> Self {
		EngineError::Inval
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_bytes() {
		let p = Proof::encode(ProofType::Exists, vec![1, 2, 3]);
		let bytes = p.clone().into_bytes();
		let decoded = Proof::from_bytes(bytes.clone()).unwrap();
		assert_eq!(decoded.as_bytes(), bytes.as_slice());
		assert_eq!(decoded.kind(), ProofType::Exists);
		assert_eq!(decoded.payload(), &[1, 2, 3]);
	}

	#[test]
	fn unknown_tag_does_not_panic() {
		let p = Proof::from_bytes(vec![250, 9, 9]).unwrap();
		assert_eq!(p.kind(), ProofType::Unknown);
	}

	#[test]
	fn rejects_empty_and_oversized() {
		assert!(Proof::from_bytes(Vec::new()).is_err());
		assert!(Proof::from_bytes(vec![0u8; MAX_PROOF_SIZE + 1]).is_err());
	}

	#[test]
	fn kind_is_cached() {
		let p = Proof::from_bytes(vec![3, 1]).unwrap();
		assert_eq!(p.kind(), ProofType::Exists);
		// second call hits the cache; same answer.
		assert_eq!(p.kind(), ProofType::Exists);
	}
}
