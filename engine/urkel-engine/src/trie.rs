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

use std::collections::HashMap;

use urkel_primitives::{EngineError, Hash, Value};

use crate::hashing::{first_diff_bit, internal_hash, leaf_hash};

/// The bit position, counting from the most significant bit of the key,
/// above which two keys sharing that many leading bits are folded into a
/// `Collision`-type proof rather than a `Short`-type one. Chosen so that an
/// ordinary unrelated key essentially never crosses it (odds `2^-248`)
/// while a key deliberately built by flipping a key's trailing byte always
/// does.
pub const COLLISION_BIT: usize = 248;

pub const MAX_DEPTH: usize = 256;

/// One node in the content-addressed trie, keyed in the backing map by its
/// own hash. The map never deletes an entry except during compaction, so a
/// historical root stays servable for as long as the engine keeps the file
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
	Internal { left: Hash, right: Hash },
	Leaf { key: Hash, value: Value },
}

pub type NodeStore = HashMap<Hash, NodeData>;

fn get_node<'a>(store: &'a NodeStore, hash: &Hash) -> Result<&'a NodeData, EngineError> {
	store.get(hash).ok_or(EngineError::Corruption)
}

/// Point lookup. `root == Hash::ZERO` means the empty tree.
pub fn get(store: &NodeStore, root: Hash, key: &Hash) -> Result<Option<Value>, EngineError> {
	let mut current = root;
	let mut depth = 0usize;
	loop {
		if current.is_zero() {
			return Ok(None);
		}
		match get_node(store, &current)? {
			NodeData::Leaf { key: lk, value } => {
				return Ok(if lk == key { Some(value.clone()) } else { None });
			}
			NodeData::Internal { left, right } => {
				if depth >= MAX_DEPTH {
					return Err(EngineError::TooDeep);
				}
				current = if key.bit(depth) { *right } else { *left };
				depth += 1;
			}
		}
	}
}

/// Builds (or extends) the single-child chain needed to separate two
/// leaves that still agree on every bit visited so far. Both leaves keep
/// their original key; only new `Internal` wrappers are created.
fn split_leaves(
	store: &mut NodeStore,
	lk: Hash,
	lv: Value,
	depth: usize,
	key: Hash,
	value: Value,
) -> Result<Hash, EngineError> {
	if depth >= MAX_DEPTH {
		return Err(EngineError::TooDeep);
	}
	let bit_l = lk.bit(depth);
	let bit_k = key.bit(depth);
	if bit_l == bit_k {
		let child = split_leaves(store, lk, lv, depth + 1, key, value)?;
		let (left, right) = if bit_k {
			(Hash::ZERO, child)
		} else {
			(child, Hash::ZERO)
		};
		let h = internal_hash(left, right);
		store.insert(h, NodeData::Internal { left, right });
		Ok(h)
	} else {
		let old_h = leaf_hash(&lk, lv.as_bytes());
		store.insert(old_h, NodeData::Leaf { key: lk, value: lv });
		let new_h = leaf_hash(&key, value.as_bytes());
		store.insert(new_h, NodeData::Leaf { key, value });
		let (left, right) = if bit_k { (old_h, new_h) } else { (new_h, old_h) };
		let h = internal_hash(left, right);
		store.insert(h, NodeData::Internal { left, right });
		Ok(h)
	}
}

pub fn insert(
	store: &mut NodeStore,
	root: Hash,
	depth: usize,
	key: Hash,
	value: Value,
) -> Result<Hash, EngineError> {
	if root.is_zero() {
		let h = leaf_hash(&key, value.as_bytes());
		store.insert(h, NodeData::Leaf { key, value });
		return Ok(h);
	}
	let node = get_node(store, &root)?.clone();
	match node {
		NodeData::Leaf { key: lk, value: lv } => {
			if lk == key {
				let h = leaf_hash(&key, value.as_bytes());
				store.insert(h, NodeData::Leaf { key, value });
				Ok(h)
			} else {
				split_leaves(store, lk, lv, depth, key, value)
			}
		}
		NodeData::Internal { left, right } => {
			if depth >= MAX_DEPTH {
				return Err(EngineError::TooDeep);
			}
			if key.bit(depth) {
				let right = insert(store, right, depth + 1, key, value)?;
				let h = internal_hash(left, right);
				store.insert(h, NodeData::Internal { left, right });
				Ok(h)
			} else {
				let left = insert(store, left, depth + 1, key, value)?;
				let h = internal_hash(left, right);
				store.insert(h, NodeData::Internal { left, right });
				Ok(h)
			}
		}
	}
}

/// Removes `key` if present. A no-op (returns `root` unchanged) if the key
/// is absent; the virtual batch and transaction layers treat `remove` as
/// idempotent rather than erroring on a missing key.
pub fn remove(store: &mut NodeStore, root: Hash, depth: usize, key: Hash) -> Result<Hash, EngineError> {
	if root.is_zero() {
		return Ok(Hash::ZERO);
	}
	let node = get_node(store, &root)?.clone();
	match node {
		NodeData::Leaf { key: lk, .. } => {
			if lk == key {
				Ok(Hash::ZERO)
			} else {
				Ok(root)
			}
		}
		NodeData::Internal { left, right } => {
			if depth >= MAX_DEPTH {
				return Err(EngineError::TooDeep);
			}
			let (left, right) = if key.bit(depth) {
				(left, remove(store, right, depth + 1, key)?)
			} else {
				(remove(store, left, depth + 1, key)?, right)
			};
			if left.is_zero() && right.is_zero() {
				Ok(Hash::ZERO)
			} else {
				let h = internal_hash(left, right);
				store.insert(h, NodeData::Internal { left, right });
				Ok(h)
			}
		}
	}
}

/// The shape of the terminal node a path search landed on, with the
/// evidence a proof encoder needs to describe it.
pub enum Walk {
	DeadEnd { depth: usize, siblings: Vec<Hash> },
	Short {
		depth: usize,
		siblings: Vec<Hash>,
		leaf_key: Hash,
		leaf_value: Value,
	},
	Collision {
		depth: usize,
		siblings: Vec<Hash>,
		leaf_key: Hash,
		leaf_value: Value,
	},
	Exists {
		depth: usize,
		siblings: Vec<Hash>,
		value: Value,
	},
}

/// Walks from `root` following `key`'s bits, recording the sibling at each
/// level (root-to-leaf order) until it hits an empty subtree or a leaf.
pub fn walk(store: &NodeStore, root: Hash, key: &Hash) -> Result<Walk, EngineError> {
	let mut current = root;
	let mut depth = 0usize;
	let mut siblings = Vec::new();
	loop {
		if current.is_zero() {
			return Ok(Walk::DeadEnd { depth, siblings });
		}
		match get_node(store, &current)? {
			NodeData::Leaf { key: lk, value } => {
				if lk == key {
					return Ok(Walk::Exists {
						depth,
						siblings,
						value: value.clone(),
					});
				}
				let fb = first_diff_bit(lk, key);
				return Ok(if fb >= COLLISION_BIT {
					Walk::Collision {
						depth,
						siblings,
						leaf_key: *lk,
						leaf_value: value.clone(),
					}
				} else {
					Walk::Short {
						depth,
						siblings,
						leaf_key: *lk,
						leaf_value: value.clone(),
					}
				});
			}
			NodeData::Internal { left, right } => {
				if depth >= MAX_DEPTH {
					return Err(EngineError::TooDeep);
				}
				let (sibling, next) = if key.bit(depth) {
					(*left, *right)
				} else {
					(*right, *left)
				};
				siblings.push(sibling);
				current = next;
				depth += 1;
			}
		}
	}
}

/// Collects every `(key, value)` pair reachable from `root`, in ascending
/// lexicographic key order. A left-first (bit 0 first) depth-first walk of
/// a trie keyed on the key's own bits visits leaves in that order for
/// free, since `Hash::bit` reads most-significant-bit first.
pub fn collect_in_order(store: &NodeStore, root: Hash) -> Result<Vec<(Hash, Value)>, EngineError> {
	let mut out = Vec::new();
	collect_rec(store, root, &mut out)?;
	Ok(out)
}

fn collect_rec(store: &NodeStore, root: Hash, out: &mut Vec<(Hash, Value)>) -> Result<(), EngineError> {
	if root.is_zero() {
		return Ok(());
	}
	match get_node(store, &root)? {
		NodeData::Leaf { key, value } => {
			out.push((*key, value.clone()));
			Ok(())
		}
		NodeData::Internal { left, right } => {
			collect_rec(store, *left, out)?;
			collect_rec(store, *right, out)
		}
	}
}

/// Depth-first collects every hash reachable from `root`, used by
/// compaction to decide what to keep.
pub fn reachable(store: &NodeStore, root: Hash) -> Result<Vec<Hash>, EngineError> {
	let mut out = Vec::new();
	reachable_rec(store, root, &mut out)?;
	Ok(out)
}

fn reachable_rec(store: &NodeStore, root: Hash, out: &mut Vec<Hash>) -> Result<(), EngineError> {
	if root.is_zero() {
		return Ok(());
	}
	out.push(root);
	if let NodeData::Internal { left, right } = get_node(store, &root)? {
		let (left, right) = (*left, *right);
		reachable_rec(store, left, out)?;
		reachable_rec(store, right, out)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

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
	fn insert_then_get_roundtrips() {
		let mut store = NodeStore::new();
		let mut root = Hash::ZERO;
		root = insert(&mut store, root, 0, key(1), val("one")).unwrap();
		root = insert(&mut store, root, 0, key(2), val("two")).unwrap();
		assert_eq!(get(&store, root, &key(1)).unwrap(), Some(val("one")));
		assert_eq!(get(&store, root, &key(2)).unwrap(), Some(val("two")));
		assert_eq!(get(&store, root, &key(3)).unwrap(), None);
	}

	#[test]
	fn remove_drops_key_and_is_idempotent() {
		let mut store = NodeStore::new();
		let mut root = Hash::ZERO;
		root = insert(&mut store, root, 0, key(1), val("one")).unwrap();
		root = insert(&mut store, root, 0, key(2), val("two")).unwrap();
		root = remove(&mut store, root, 0, key(1)).unwrap();
		assert_eq!(get(&store, root, &key(1)).unwrap(), None);
		assert_eq!(get(&store, root, &key(2)).unwrap(), Some(val("two")));
		let root2 = remove(&mut store, root, 0, key(1)).unwrap();
		assert_eq!(root2, root);
	}

	#[test]
	fn empty_tree_is_deadend_for_any_key() {
		let store = NodeStore::new();
		match walk(&store, Hash::ZERO, &key(1)).unwrap() {
			Walk::DeadEnd { depth, siblings } => {
				assert_eq!(depth, 0);
				assert!(siblings.is_empty());
			}
			_ => panic!("expected DeadEnd"),
		}
	}

	#[test]
	fn near_collision_key_classifies_as_collision() {
		let mut store = NodeStore::new();
		let mut root = Hash::ZERO;
		let real = key(1);
		root = insert(&mut store, root, 0, real, val("one")).unwrap();
		let mut bytes = *real.as_bytes();
		bytes[31] = 0; // clears only the trailing byte
		let near = Hash::from(bytes);
		match walk(&store, root, &near).unwrap() {
			Walk::Collision { leaf_key, .. } => assert_eq!(leaf_key, real),
			Walk::DeadEnd { .. } => panic!("expected Collision, got DeadEnd"),
			Walk::Short { .. } => panic!("expected Collision, got Short"),
			Walk::Exists { .. } => panic!("expected Collision, got Exists"),
		}
	}

	#[test]
	fn unrelated_key_classifies_as_short_or_deadend() {
		let mut store = NodeStore::new();
		let mut root = Hash::ZERO;
		for i in 1..=4u8 {
			root = insert(&mut store, root, 0, key(i), val("v")).unwrap();
		}
		let unrelated = key(200);
		match walk(&store, root, &unrelated).unwrap() {
			Walk::DeadEnd { .. } => {}
			Walk::Short { .. } => {}
			Walk::Collision { .. } => panic!("an unrelated random key should not land on a collision"),
			Walk::Exists { .. } => panic!("key(200) was never inserted"),
		}
	}
}
