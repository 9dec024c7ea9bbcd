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

//! Integration tests against the on-disk engine: a tree directory is
//! created under a `tempfile::tempdir()`, closed, and reopened to check
//! that commits actually persisted (spec.md §8).

use futures::executor::block_on;
use urkel_store::{CoreError, DiskTree, Hash, Tree, Value};

fn key(b: u8) -> Hash {
	let mut bytes = [0u8; 32];
	bytes[0] = b;
	Hash::from(bytes)
}

fn val(s: &str) -> Value {
	Value::new(s.as_bytes().to_vec()).unwrap()
}

#[test]
fn commit_survives_close_and_reopen() {
	block_on(async {
		let dir = tempfile::tempdir().unwrap();
		let prefix = dir.path().to_str().unwrap().to_owned();

		let tree: DiskTree = Tree::new(2);
		tree.open(prefix.clone()).await.unwrap();
		let batch = tree.transaction().await.unwrap();
		batch.insert(key(1), val("hello")).await.unwrap();
		let root = batch.commit().await.unwrap();
		batch.close().await;
		tree.close().await;

		let reopened: DiskTree = Tree::new(2);
		let reopened_root = reopened.open(prefix).await.unwrap();
		assert_eq!(reopened_root, root);
		assert_eq!(reopened.get(key(1)).await.unwrap(), Some(val("hello")));
		reopened.close().await;
	});
}

#[test]
fn second_open_of_a_locked_prefix_fails() {
	block_on(async {
		let dir = tempfile::tempdir().unwrap();
		let prefix = dir.path().to_str().unwrap().to_owned();

		let tree: DiskTree = Tree::new(1);
		tree.open(prefix.clone()).await.unwrap();

		let second: DiskTree = Tree::new(1);
		let err = second.open(prefix.clone()).await.unwrap_err();
		assert!(matches!(err, CoreError::Engine(_)));

		tree.close().await;
	});
}

#[test]
fn compact_preserves_reachable_data() {
	block_on(async {
		let dir = tempfile::tempdir().unwrap();
		let prefix = dir.path().to_str().unwrap().to_owned();
		let tmp_dir = tempfile::tempdir().unwrap();
		let tmp_prefix = tmp_dir.path().to_str().unwrap().to_owned();

		let tree: DiskTree = Tree::new(2);
		tree.open(prefix).await.unwrap();
		let batch = tree.transaction().await.unwrap();
		for i in 1..=5u8 {
			batch.insert(key(i), val("v")).await.unwrap();
		}
		batch.commit().await.unwrap();
		batch.close().await;

		tree.compact(tmp_prefix.clone(), None).await.unwrap();

		let compacted: DiskTree = Tree::new(1);
		compacted.open(tmp_prefix).await.unwrap();
		for i in 1..=5u8 {
			assert_eq!(compacted.get(key(i)).await.unwrap(), Some(val("v")));
		}
		compacted.close().await;
		tree.close().await;
	});
}
