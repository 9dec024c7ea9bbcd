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
use std::ops::Deref;

/// Values are small opaque byte strings; the trie format this crate's engine
/// uses caps a leaf value at this many bytes.
pub const MAX_VALUE_SIZE: usize = 1023;

/// An owned, length-checked value.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Value(Vec<u8>);

/// A value exceeded [`MAX_VALUE_SIZE`].
#[derive(Debug, thiserror::Error)]
#[error("value of {0} bytes exceeds the {MAX_VALUE_SIZE}-byte maximum")]
pub struct ValueTooLarge(pub usize);

impl Value {
	pub fn new(bytes: Vec<u8>) -> Result<Self, ValueTooLarge> {
		if bytes.len() > MAX_VALUE_SIZE {
			return Err(ValueTooLarge(bytes.len()));
		}
		Ok(Value(bytes))
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl Deref for Value {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		&self.0
	}
}

impl TryFrom<Vec<u8>> for Value {
	type Error = ValueTooLarge;

	fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
		Value::new(bytes)
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Value({} bytes)", self.0.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_up_to_max() {
		assert!(Value::new(vec![0u8; MAX_VALUE_SIZE]).is_ok());
	}

	#[test]
	fn rejects_over_max() {
		assert!(Value::new(vec![0u8; MAX_VALUE_SIZE + 1]).is_err());
	}

	#[test]
	fn empty_is_valid() {
		assert!(Value::new(Vec::new()).is_ok());
	}
}
