//! Deterministic unique IDs
//!
//! IDs are SHA-256 digests over the identity of an element and its parent's
//! ID, so re-discovering the same test always yields the same ID.

use sha2::{Digest, Sha256};

use crate::model::ArgValue;

struct IdHasher {
    hasher: Sha256,
}

impl IdHasher {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn add(mut self, part: &str) -> Self {
        self.hasher.update(part.as_bytes());
        // NUL separator so ("ab", "c") and ("a", "bc") differ
        self.hasher.update([0u8]);
        self
    }

    fn add_opt(self, part: Option<&str>) -> Self {
        match part {
            Some(part) => self.add("1").add(part),
            None => self.add("0"),
        }
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

pub fn for_assembly(assembly_name: &str, assembly_path: Option<&str>, config_file_path: Option<&str>) -> String {
    IdHasher::new()
        .add(assembly_name)
        .add_opt(assembly_path)
        .add_opt(config_file_path)
        .finish()
}

pub fn for_test_collection(assembly_unique_id: &str, collection_display_name: &str) -> String {
    IdHasher::new()
        .add(assembly_unique_id)
        .add(collection_display_name)
        .finish()
}

pub fn for_test_class(collection_unique_id: &str, class_name: &str) -> String {
    IdHasher::new().add(collection_unique_id).add(class_name).finish()
}

pub fn for_test_method(class_unique_id: &str, method_name: &str) -> String {
    IdHasher::new().add(class_unique_id).add(method_name).finish()
}

pub fn for_test_case(method_unique_id: &str, arguments: &[ArgValue]) -> String {
    arguments
        .iter()
        .fold(IdHasher::new().add(method_unique_id), |hasher, argument| {
            hasher.add(&argument.to_string())
        })
        .finish()
}

/// Shortened ID for log output
pub fn short(unique_id: &str) -> &str {
    &unique_id[..unique_id.len().min(8)]
}
