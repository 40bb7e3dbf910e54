//! Test case persistence
//!
//! A test case is encoded into an opaque token (JSON text) which can cross a
//! process boundary and be decoded back. Method bodies cannot travel, so
//! decoding resolves the method through a [`MethodLookup`] and then checks
//! that the rebuilt case has the same unique ID as the encoded one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CodecError;
use crate::model::{ArgValue, SourceInformation, TestCase, TestMethod, Traits};

const TOKEN_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SerializedTestCase {
    version: u32,
    unique_id: String,
    assembly_name: String,
    assembly_path: Option<String>,
    config_file_path: Option<String>,
    collection: String,
    class_name: String,
    method_name: String,
    arguments: Vec<ArgValue>,
    display_name: String,
    skip_reason: Option<String>,
    timeout_ms: u64,
    traits: Traits,
    source_information: Option<SourceInformation>,
}

/// Identity of a method as recorded in a token
#[derive(Debug, Clone, Copy)]
pub struct MethodReference<'a> {
    pub assembly_name: &'a str,
    pub assembly_path: Option<&'a str>,
    pub config_file_path: Option<&'a str>,
    pub collection: &'a str,
    pub class_name: &'a str,
    pub method_name: &'a str,
}

/// Resolves a recorded method identity to live metadata
pub trait MethodLookup {
    fn find_method(&self, reference: &MethodReference<'_>) -> Option<Arc<TestMethod>>;
}

/// Lookup over a fixed set of known methods
#[derive(Debug, Default, Clone)]
pub struct MethodCatalog {
    methods: Vec<Arc<TestMethod>>,
}

impl MethodCatalog {
    pub fn new(methods: impl IntoIterator<Item = Arc<TestMethod>>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    pub fn add(&mut self, method: Arc<TestMethod>) {
        self.methods.push(method);
    }
}

impl MethodLookup for MethodCatalog {
    fn find_method(&self, reference: &MethodReference<'_>) -> Option<Arc<TestMethod>> {
        self.methods
            .iter()
            .find(|method| {
                let class = &method.class;
                method.name == reference.method_name
                    && class.name == reference.class_name
                    && class.collection.display_name == reference.collection
                    && class.assembly().name == reference.assembly_name
            })
            .cloned()
    }
}

/// Encodes and decodes test cases to opaque string tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct TestCaseCodec;

impl TestCaseCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, test_case: &TestCase) -> Result<String, CodecError> {
        let class = test_case.class();
        let assembly = test_case.assembly();

        let serialized = SerializedTestCase {
            version: TOKEN_VERSION,
            unique_id: test_case.unique_id.clone(),
            assembly_name: assembly.name.clone(),
            assembly_path: assembly.path.clone(),
            config_file_path: assembly.config_file_path.clone(),
            collection: test_case.collection().display_name.clone(),
            class_name: class.name.clone(),
            method_name: test_case.method.name.clone(),
            arguments: test_case.arguments.clone(),
            display_name: test_case.display_name.clone(),
            skip_reason: test_case.skip_reason.clone(),
            timeout_ms: test_case.timeout_ms,
            traits: test_case.traits.clone(),
            source_information: test_case.source_information.clone(),
        };

        Ok(serde_json::to_string(&serialized)?)
    }

    pub fn decode(&self, token: &str, lookup: &dyn MethodLookup) -> Result<TestCase, CodecError> {
        let serialized: SerializedTestCase = serde_json::from_str(token)?;
        if serialized.version != TOKEN_VERSION {
            return Err(CodecError::UnsupportedVersion(serialized.version));
        }

        let reference = MethodReference {
            assembly_name: &serialized.assembly_name,
            assembly_path: serialized.assembly_path.as_deref(),
            config_file_path: serialized.config_file_path.as_deref(),
            collection: &serialized.collection,
            class_name: &serialized.class_name,
            method_name: &serialized.method_name,
        };
        let method = lookup
            .find_method(&reference)
            .ok_or_else(|| CodecError::unknown_method(&serialized.class_name, &serialized.method_name))?;

        let mut test_case = TestCase::new(method, serialized.arguments)
            .with_display_name(serialized.display_name)
            .with_timeout_ms(serialized.timeout_ms)
            .with_traits(serialized.traits);
        test_case.skip_reason = serialized.skip_reason;
        test_case.source_information = serialized.source_information;

        if test_case.unique_id != serialized.unique_id {
            return Err(CodecError::identity_mismatch(serialized.unique_id, test_case.unique_id));
        }

        Ok(test_case)
    }
}
