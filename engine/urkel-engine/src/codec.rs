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

//! Wire format for `Proof` payloads and the pure `verify` function. Format
//! per kind, after the type tag `urkel_primitives::Proof` already carries:
//!
//! ```text
//! DeadEnd:            depth:u16 | siblings: depth * 32 bytes
//! Short / Collision:  depth:u16 | leaf_key: 32 bytes | value_len:u16 | value | siblings
//! Exists:             depth:u16 | value_len:u16 | value | siblings
//! ```
//!
//! Siblings are encoded root-to-leaf; verification folds them leaf-to-root.

use urkel_primitives::{EngineError, Hash, Proof, ProofType, Value, VerifyCode};

use crate::hashing::{internal_hash, leaf_hash};
use crate::trie::{Walk, COLLISION_BIT, MAX_DEPTH};

fn push_siblings(buf: &mut Vec<u8>, siblings: &[Hash]) {
	for s in siblings {
		buf.extend_from_slice(s.as_bytes());
	}
}

pub fn encode(walk: Walk) -> Proof {
	match walk {
		Walk::DeadEnd { depth, siblings } => {
			let mut buf = Vec::with_capacity(2 + siblings.len() * 32);
			buf.extend_from_slice(&(depth as u16).to_le_bytes());
			push_siblings(&mut buf, &siblings);
			Proof::encode(ProofType::DeadEnd, buf)
		}
		Walk::Short {
			depth,
			siblings,
			leaf_key,
			leaf_value,
		} => encode_mismatch(ProofType::Short, depth, siblings, leaf_key, leaf_value),
		Walk::Collision {
			depth,
			siblings,
			leaf_key,
			leaf_value,
		} => encode_mismatch(ProofType::Collision, depth, siblings, leaf_key, leaf_value),
		Walk::Exists {
			depth,
			siblings,
			value,
		} => {
			let mut buf = Vec::with_capacity(4 + value.as_bytes().len() + siblings.len() * 32);
			buf.extend_from_slice(&(depth as u16).to_le_bytes());
			buf.extend_from_slice(&(value.as_bytes().len() as u16).to_le_bytes());
			buf.extend_from_slice(value.as_bytes());
			push_siblings(&mut buf, &siblings);
			Proof::encode(ProofType::Exists, buf)
		}
	}
}

fn encode_mismatch(kind: ProofType, depth: usize, siblings: Vec<Hash>, leaf_key: Hash, leaf_value: Value) -> Proof {
	let mut buf = Vec::with_capacity(36 + leaf_value.as_bytes().len() + siblings.len() * 32);
	buf.extend_from_slice(&(depth as u16).to_le_bytes());
	buf.extend_from_slice(leaf_key.as_bytes());
	buf.extend_from_slice(&(leaf_value.as_bytes().len() as u16).to_le_bytes());
	buf.extend_from_slice(leaf_value.as_bytes());
	push_siblings(&mut buf, &siblings);
	Proof::encode(kind, buf)
}

struct Reader<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		Reader { bytes, pos: 0 }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], EngineError> {
		let end = self.pos.checked_add(n).ok_or(EngineError::Inval)?;
		let slice = self.bytes.get(self.pos..end).ok_or(EngineError::Inval)?;
		self.pos = end;
		Ok(slice)
	}

	fn u16(&mut self) -> Result<u16, EngineError> {
		let b = self.take(2)?;
		Ok(u16::from_le_bytes([b[0], b[1]]))
	}

	fn hash(&mut self) -> Result<Hash, EngineError> {
		let b = self.take(32)?;
		let mut out = [0u8; 32];
		out.copy_from_slice(b);
		Ok(Hash::from(out))
	}

	fn siblings(&mut self, depth: usize) -> Result<Vec<Hash>, EngineError> {
		let mut out = Vec::with_capacity(depth);
		for _ in 0..depth {
			out.push(self.hash()?);
		}
		Ok(out)
	}

	fn finished(&self) -> bool {
		self.pos == self.bytes.len()
	}
}

fn fold(siblings: &[Hash], key: &Hash, mut current: Hash) -> Hash {
	for (i, sibling) in siblings.iter().enumerate().rev() {
		current = if key.bit(i) {
			internal_hash(*sibling, current)
		} else {
			internal_hash(current, *sibling)
		};
	}
	current
}

/// Pure verification: recomputes the claimed root from the proof's siblings
/// and terminal node, and compares against `root`. Never panics on
/// malformed `proof` bytes — any decoding failure reports
/// `VerifyCode::Failed(EngineError::Inval)`.
pub fn verify(root: Hash, key: &Hash, proof: &Proof) -> (VerifyCode, Option<Value>) {
	match decode_and_check(root, key, proof) {
		Ok(outcome) => outcome,
		Err(e) => (VerifyCode::Failed(e), None),
	}
}

fn decode_and_check(root: Hash, key: &Hash, proof: &Proof) -> Result<(VerifyCode, Option<Value>), EngineError> {
	let mut r = Reader::new(proof.payload());
	match proof.kind() {
		ProofType::DeadEnd => {
			let depth = r.u16()? as usize;
			if depth > MAX_DEPTH {
				return Err(EngineError::TooDeep);
			}
			let siblings = r.siblings(depth)?;
			if !r.finished() {
				return Err(EngineError::Inval);
			}
			let computed = fold(&siblings, key, Hash::ZERO);
			Ok(ok_or_mismatch(computed, root, None))
		}
		ProofType::Short | ProofType::Collision => {
			let depth = r.u16()? as usize;
			if depth > MAX_DEPTH {
				return Err(EngineError::TooDeep);
			}
			let leaf_key = r.hash()?;
			let value_len = r.u16()? as usize;
			let value_bytes = r.take(value_len)?.to_vec();
			let siblings = r.siblings(depth)?;
			if !r.finished() {
				return Err(EngineError::Inval);
			}
			if leaf_key == *key {
				// A Short/Collision proof whose embedded leaf matches the
				// key being verified would otherwise "prove" the absence
				// of a key that is in fact present — refuse instead.
				return Err(EngineError::SameKey);
			}
			let leaf = leaf_hash(&leaf_key, &value_bytes);
			let computed = fold(&siblings, key, leaf);
			Ok(ok_or_mismatch(computed, root, None))
		}
		ProofType::Exists => {
			let depth = r.u16()? as usize;
			if depth > MAX_DEPTH {
				return Err(EngineError::TooDeep);
			}
			let value_len = r.u16()? as usize;
			let value_bytes = r.take(value_len)?.to_vec();
			let siblings = r.siblings(depth)?;
			if !r.finished() {
				return Err(EngineError::Inval);
			}
			let value = Value::new(value_bytes.clone()).map_err(|_| EngineError::Inval)?;
			let leaf = leaf_hash(key, &value_bytes);
			let computed = fold(&siblings, key, leaf);
			Ok(ok_or_mismatch(computed, root, Some(value)))
		}
		ProofType::Unknown => Err(EngineError::Inval),
	}
}

fn ok_or_mismatch(computed: Hash, root: Hash, value: Option<Value>) -> (VerifyCode, Option<Value>) {
	if computed == root {
		(VerifyCode::Ok, value)
	} else {
		(VerifyCode::Failed(EngineError::HashMismatch), None)
	}
}

/// Just the heuristic this module shares with `trie::walk`; re-exported so
/// callers that need to reason about proof size can see the threshold.
pub const fn collision_bit() -> usize {
	COLLISION_BIT
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::trie::{self, NodeStore};

	fn key(b: u8) -> Hash {
		let mut bytes = [0u8; 32];
		bytes[0] = b;
		bytes[31] = b;
		Hash::from(bytes)
	}

	fn val(s: &str) -> Value {
		Value::new(s.as_bytes().to_vec()).unwrap()
	}

	#[test]
	fn exists_proof_verifies_and_returns_value() {
		let mut store = NodeStore::new();
		let root = trie::insert(&mut store, Hash::ZERO, 0, key(1), val("one")).unwrap();
		let w = trie::walk(&store, root, &key(1)).unwrap();
		let proof = encode(w);
		let (code, value) = verify(root, &key(1), &proof);
		assert_eq!(code, VerifyCode::Ok);
		assert_eq!(value, Some(val("one")));
	}

	#[test]
	fn deadend_proof_verifies_on_empty_tree() {
		let w = trie::walk(&NodeStore::new(), Hash::ZERO, &key(9)).unwrap();
		let proof = encode(w);
		let (code, value) = verify(Hash::ZERO, &key(9), &proof);
		assert_eq!(code, VerifyCode::Ok);
		assert_eq!(value, None);
	}

	#[test]
	fn exists_proof_against_modified_key_is_hash_mismatch() {
		let mut store = NodeStore::new();
		let root = trie::insert(&mut store, Hash::ZERO, 0, key(1), val("one")).unwrap();
		let w = trie::walk(&store, root, &key(1)).unwrap();
		let proof = encode(w);
		let mut bytes = *key(1).as_bytes();
		bytes[31] = 0;
		let modified = Hash::from(bytes);
		let (code, _) = verify(root, &modified, &proof);
		assert_eq!(code, VerifyCode::Failed(EngineError::HashMismatch));
	}

	#[test]
	fn collision_proof_against_its_own_leaf_key_is_samekey() {
		let mut store = NodeStore::new();
		let root = trie::insert(&mut store, Hash::ZERO, 0, key(1), val("one")).unwrap();
		let mut bytes = *key(1).as_bytes();
		bytes[31] = 0;
		let near = Hash::from(bytes);
		let w = trie::walk(&store, root, &near).unwrap();
		assert!(matches!(w, trie::Walk::Collision { .. }));
		let proof = encode(w);
		let (code, _) = verify(root, &key(1), &proof);
		assert_eq!(code, VerifyCode::Failed(EngineError::SameKey));
	}

	#[test]
	fn malformed_bytes_never_panic() {
		let garbage = Proof::from_bytes(vec![3, 255, 255, 255, 255, 255]).unwrap();
		let (code, _) = verify(Hash::ZERO, &key(1), &garbage);
		assert!(matches!(code, VerifyCode::Failed(_)));
	}
}
