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

use blake2::Blake2b;
use digest::consts::U32;
use digest::Digest;
use urkel_primitives::Hash;

type Blake2b256 = Blake2b<U32>;

const INTERNAL_TAG: u8 = 0x01;
const LEAF_TAG: u8 = 0x00;

/// Plain BLAKE2b-256 of `data`, used for hashing leaf values before they go
/// into a leaf's pre-image.
pub fn blake2b_256(data: &[u8]) -> Hash {
	let mut hasher = Blake2b256::new();
	hasher.update(data);
	let digest = hasher.finalize();
	let mut out = [0u8; 32];
	out.copy_from_slice(&digest);
	Hash::from(out)
}

/// `H(0x01 || left || right)`. The tag keeps an internal node's hash from
/// ever colliding with a leaf's.
pub fn internal_hash(left: Hash, right: Hash) -> Hash {
	let mut hasher = Blake2b256::new();
	hasher.update([INTERNAL_TAG]);
	hasher.update(left.as_bytes());
	hasher.update(right.as_bytes());
	let digest = hasher.finalize();
	let mut out = [0u8; 32];
	out.copy_from_slice(&digest);
	Hash::from(out)
}

/// `H(0x00 || key || H(value))`. The value is hashed separately so a proof
/// only needs to carry the value bytes once, at the leaf.
pub fn leaf_hash(key: &Hash, value_bytes: &[u8]) -> Hash {
	let vhash = blake2b_256(value_bytes);
	let mut hasher = Blake2b256::new();
	hasher.update([LEAF_TAG]);
	hasher.update(key.as_bytes());
	hasher.update(vhash.as_bytes());
	let digest = hasher.finalize();
	let mut out = [0u8; 32];
	out.copy_from_slice(&digest);
	Hash::from(out)
}

/// The bit index (0 = MSB of byte 0) at which `a` and `b` first differ.
/// Panics if `a == b`; callers only ever reach here after confirming the
/// keys differ.
pub fn first_diff_bit(a: &Hash, b: &Hash) -> usize {
	for i in 0..256 {
		if a.bit(i) != b.bit(i) {
			return i;
		}
	}
	unreachable!("first_diff_bit called with equal keys")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn internal_and_leaf_hashes_differ() {
		let l = leaf_hash(&Hash::ZERO, b"v");
		let i = internal_hash(Hash::ZERO, Hash::ZERO);
		assert_ne!(l, i);
	}

	#[test]
	fn first_diff_bit_finds_msb_difference() {
		let mut a = [0u8; 32];
		let mut b = [0u8; 32];
		a[0] = 0b1000_0000;
		b[0] = 0b0000_0000;
		assert_eq!(first_diff_bit(&Hash::from(a), &Hash::from(b)), 0);
	}

	#[test]
	fn first_diff_bit_finds_tail_difference() {
		let mut a = [0u8; 32];
		let b = [0u8; 32];
		a[31] = 1;
		assert_eq!(first_diff_bit(&Hash::from(a), &Hash::from(b)), 255);
	}
}
