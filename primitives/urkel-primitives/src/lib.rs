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

//! Shared data model for the Urkel tree key-value store: the fixed-size
//! `Hash`/`Value`/`Proof` types, the engine errno taxonomy, and the `Engine`
//! trait that names the out-of-scope trie algorithms (node layout, proof
//! encoding, BLAKE2b hashing, compaction) as a collaborator interface
//! consumed by `urkel-store`.

mod engine;
mod error;
mod hash;
mod proof;
mod value;

pub use engine::{Engine, Op, StoreStat};
pub use error::{EngineError, VerifyCode};
pub use hash::{Hash, HashParseError, HASH_SIZE};
pub use proof::{Proof, ProofEncodingError, ProofType, MAX_PROOF_SIZE};
pub use value::{Value, ValueTooLarge, MAX_VALUE_SIZE};
