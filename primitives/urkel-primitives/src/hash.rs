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

use std::fmt;
use std::str::FromStr;

/// Size in bytes of a BLAKE2b-256 digest, and of every key in the store.
pub const HASH_SIZE: usize = 32;

/// A 32-byte BLAKE2b-256 digest. Doubles as the fixed-size key type and as a
/// tree root.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
	/// The all-zero hash. Used as the canonical empty-tree root.
	pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; HASH_SIZE]
	}

	pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
		&self.0
	}

	/// Returns the bit at `index` (0 = most significant bit of byte 0), the
	/// convention the trie uses to walk a key from the root down.
	pub fn bit(&self, index: usize) -> bool {
		let byte = self.0[index / 8];
		(byte >> (7 - (index % 8))) & 1 == 1
	}
}

impl From<[u8; HASH_SIZE]> for Hash {
	fn from(bytes: [u8; HASH_SIZE]) -> Self {
		Hash(bytes)
	}
}

impl AsRef<[u8]> for Hash {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Hash({})", hex::encode(self.0))
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", hex::encode(self.0))
	}
}

/// Error returned when parsing a hash from a hex string of the wrong shape.
#[derive(Debug, thiserror::Error)]
#[error("invalid hash: expected {HASH_SIZE} bytes of hex, got {0:?}")]
pub struct HashParseError(String);

impl FromStr for Hash {
	type Err = HashParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes = hex::decode(s).map_err(|_| HashParseError(s.to_owned()))?;
		if bytes.len() != HASH_SIZE {
			return Err(HashParseError(s.to_owned()));
		}
		let mut out = [0u8; HASH_SIZE];
		out.copy_from_slice(&bytes);
		Ok(Hash(out))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_is_zero() {
		assert!(Hash::ZERO.is_zero());
		assert!(!Hash::ZERO.bit(0));
	}

	#[test]
	fn hex_round_trip() {
		let h = Hash([7u8; HASH_SIZE]);
		let s = h.to_string();
		assert_eq!(s.parse::<Hash>().unwrap(), h);
	}

	#[test]
	fn bit_order_is_msb_first() {
		let mut bytes = [0u8; HASH_SIZE];
		bytes[0] = 0b1000_0000;
		let h = Hash(bytes);
		assert!(h.bit(0));
		assert!(!h.bit(1));
	}

	#[test]
	fn rejects_wrong_length() {
		assert!("abcd".parse::<Hash>().is_err());
	}
}
