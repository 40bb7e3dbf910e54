//! Translation of legacy nodes into xunit metadata

use indexmap::IndexMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use xunit_sdk::codec::{MethodLookup, MethodReference};
use xunit_sdk::metadata::SourceInformationProvider;
use xunit_sdk::{FailureInformation, Fault, TestAssembly, TestCase, TestClass, TestCollection, TestMethod, Traits};

use crate::node::LegacyNode;

const FAILURE_NODE: &str = "failure";
const UNKNOWN_EXCEPTION_TYPE: &str = "Exception";

/// Metadata for one legacy assembly, rebuilt from class and method names.
///
/// Legacy engines expose no identity beyond names, so classes and methods are
/// interned by name to keep a single shared instance per name.
#[derive(Debug)]
pub struct LegacyModel {
    assembly: Arc<TestAssembly>,
    collection: Arc<TestCollection>,
    classes: Mutex<IndexMap<String, Arc<TestClass>>>,
    methods: Mutex<IndexMap<(String, String), Arc<TestMethod>>>,
}

impl LegacyModel {
    pub fn new(assembly_file_name: &str, config_file_name: Option<&str>) -> Self {
        let assembly_name = Path::new(assembly_file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(assembly_file_name)
            .to_string();
        let assembly = Arc::new(TestAssembly::new(
            assembly_name,
            Some(assembly_file_name.to_string()),
            config_file_name.map(String::from),
        ));
        let collection = Arc::new(TestCollection::new(
            assembly.clone(),
            format!("xUnit.net v1 Tests for {}", assembly_file_name),
        ));

        Self {
            assembly,
            collection,
            classes: Mutex::new(IndexMap::new()),
            methods: Mutex::new(IndexMap::new()),
        }
    }

    pub fn assembly(&self) -> &Arc<TestAssembly> {
        &self.assembly
    }

    pub fn collection(&self) -> &Arc<TestCollection> {
        &self.collection
    }

    pub fn class(&self, class_name: &str) -> Arc<TestClass> {
        let mut classes = self.classes.lock().unwrap_or_else(|e| e.into_inner());
        classes
            .entry(class_name.to_string())
            .or_insert_with(|| Arc::new(TestClass::new(self.collection.clone(), class_name)))
            .clone()
    }

    pub fn method(&self, class_name: &str, method_name: &str) -> Arc<TestMethod> {
        let class = self.class(class_name);
        let mut methods = self.methods.lock().unwrap_or_else(|e| e.into_inner());
        methods
            .entry((class_name.to_string(), method_name.to_string()))
            .or_insert_with(|| Arc::new(TestMethod::new(class, method_name)))
            .clone()
    }

    /// Build a test case from a discovery `method` node.
    ///
    /// Returns `None` when the node lacks its `type` or `method` attribute.
    pub fn test_case_from_node(
        &self,
        node: &LegacyNode,
        source_provider: Option<&dyn SourceInformationProvider>,
    ) -> Option<TestCase> {
        let class_name = node.attr("type").filter(|name| !name.is_empty())?;
        let method_name = node.attr("method").filter(|name| !name.is_empty())?;

        let method = self.method(class_name, method_name);
        let display_name = node
            .attr("name")
            .map(String::from)
            .unwrap_or_else(|| format!("{}.{}", class_name, method_name));

        let mut traits = Traits::new();
        if let Some(trait_nodes) = node.child("traits") {
            for trait_node in trait_nodes.children_named("trait") {
                if let (Some(name), Some(value)) = (trait_node.attr("name"), trait_node.attr("value")) {
                    traits.add(name, value);
                }
            }
        }

        let mut test_case = TestCase::new(method, Vec::new())
            .with_display_name(display_name)
            .with_traits(traits);
        if let Some(reason) = node.attr("skip") {
            test_case = test_case.with_skip_reason(reason);
        }
        if let Some(provider) = source_provider {
            let source = provider.source_information(class_name, method_name);
            if !source.is_empty() {
                test_case = test_case.with_source_information(source);
            }
        }

        debug!("Discovered legacy test {}", test_case.display_name);
        Some(test_case)
    }
}

impl MethodLookup for LegacyModel {
    fn find_method(&self, reference: &MethodReference<'_>) -> Option<Arc<TestMethod>> {
        let same_assembly = reference.assembly_name == self.assembly.name
            && reference.assembly_path == self.assembly.path.as_deref()
            && reference.config_file_path == self.assembly.config_file_path.as_deref();

        if same_assembly && reference.collection == self.collection.display_name {
            Some(self.method(reference.class_name, reference.method_name))
        } else {
            None
        }
    }
}

/// Convert a `failure` node, including nested failures, into a fault tree
pub fn fault_from_node(node: &LegacyNode) -> Fault {
    let fault_type = node.attr("exception-type").unwrap_or(UNKNOWN_EXCEPTION_TYPE);
    let message = node.child_text("message").unwrap_or_default();

    let mut fault = Fault::new(fault_type, message);
    if let Some(stack_trace) = node.child_text("stack-trace") {
        fault = fault.with_stack_trace(stack_trace);
    }
    for nested in node.children_named(FAILURE_NODE) {
        fault = fault.with_nested(fault_from_node(nested));
    }
    fault
}

pub fn failure_from_node(node: &LegacyNode) -> FailureInformation {
    FailureInformation::from_fault(&fault_from_node(node))
}

/// Parse a `time` attribute given in (fractional) seconds
pub fn parse_duration(seconds: Option<&str>) -> Duration {
    seconds
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::ZERO)
}
