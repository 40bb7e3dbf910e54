//! Test hierarchy model
//!
//! The hierarchy is assembly → collection → class → method → test case. Each
//! element holds a shared reference to its parent; the ordered children of a
//! level are the test cases handed to its runner, grouped by unique ID.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cancellation::CancellationSignal;
use crate::fault::Fault;
use crate::unique_id;

/// Argument values for constructors and test methods
pub type ArgValue = serde_json::Value;

/// Output written by a test while it runs
#[derive(Debug, Clone, Default)]
pub struct TestOutput {
    buffer: Arc<Mutex<String>>,
}

impl TestOutput {
    pub fn write_line(&self, line: impl AsRef<str>) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(line.as_ref());
        buffer.push('\n');
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Everything a test body receives when invoked
#[derive(Debug, Clone)]
pub struct TestInvocation {
    pub constructor_arguments: Vec<ArgValue>,
    pub method_arguments: Vec<ArgValue>,
    pub cancellation: CancellationSignal,
    pub output: TestOutput,
}

type BodyFn = dyn Fn(&TestInvocation) -> Result<(), Fault> + Send + Sync;

/// Invocable body of a test method
#[derive(Clone)]
pub struct TestBody(Arc<BodyFn>);

impl TestBody {
    pub fn new(body: impl Fn(&TestInvocation) -> Result<(), Fault> + Send + Sync + 'static) -> Self {
        Self(Arc::new(body))
    }

    pub fn invoke(&self, invocation: &TestInvocation) -> Result<(), Fault> {
        (self.0)(invocation)
    }
}

impl fmt::Debug for TestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TestBody(..)")
    }
}

/// Teardown hook run after each test of a class
#[derive(Clone)]
pub struct Hook(Arc<dyn Fn() -> Result<(), Fault> + Send + Sync>);

impl Hook {
    pub fn new(hook: impl Fn() -> Result<(), Fault> + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn run(&self) -> Result<(), Fault> {
        (self.0)()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

type CreateFn = dyn Fn() -> Result<ArgValue, Fault> + Send + Sync;
type DisposeFn = dyn Fn(&ArgValue) -> Result<(), Fault> + Send + Sync;

/// Shared state created when a level starts and disposed when it finishes.
///
/// Fixture values are matched by name against class constructor parameters.
#[derive(Clone)]
pub struct Fixture {
    name: String,
    create: Arc<CreateFn>,
    dispose: Option<Arc<DisposeFn>>,
}

impl Fixture {
    pub fn new(
        name: impl Into<String>,
        create: impl Fn() -> Result<ArgValue, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            create: Arc::new(create),
            dispose: None,
        }
    }

    pub fn with_dispose(mut self, dispose: impl Fn(&ArgValue) -> Result<(), Fault> + Send + Sync + 'static) -> Self {
        self.dispose = Some(Arc::new(dispose));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create(&self) -> Result<ArgValue, Fault> {
        (self.create)()
    }

    pub fn dispose(&self, value: &ArgValue) -> Result<(), Fault> {
        match &self.dispose {
            Some(dispose) => dispose(value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("name", &self.name)
            .field("disposable", &self.dispose.is_some())
            .finish()
    }
}

/// Multi-valued trait tags; values keep their insertion order per key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traits(BTreeMap<String, Vec<String>>);

impl Traits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Source location of a test, best effort
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInformation {
    pub file_name: Option<String>,
    pub line_number: Option<u32>,
}

impl SourceInformation {
    pub fn is_empty(&self) -> bool {
        self.file_name.is_none() && self.line_number.is_none()
    }
}

/// Root of the test hierarchy.
///
/// Levels hold an `Arc` to their parent and no list of children. A run's
/// collections, classes and methods are grouped from the test case list it is
/// given, in order of first appearance.
#[derive(Debug)]
pub struct TestAssembly {
    pub unique_id: String,
    pub name: String,
    pub path: Option<String>,
    pub config_file_path: Option<String>,
    pub fixtures: Vec<Fixture>,
}

impl TestAssembly {
    pub fn new(name: impl Into<String>, path: Option<String>, config_file_path: Option<String>) -> Self {
        let name = name.into();
        let unique_id = unique_id::for_assembly(&name, path.as_deref(), config_file_path.as_deref());

        Self {
            unique_id,
            name,
            path,
            config_file_path,
            fixtures: Vec::new(),
        }
    }

    pub fn with_fixture(mut self, fixture: Fixture) -> Self {
        self.fixtures.push(fixture);
        self
    }
}

/// Group of classes sharing fixtures; its classes come from the cases being run
#[derive(Debug)]
pub struct TestCollection {
    pub unique_id: String,
    pub display_name: String,
    pub assembly: Arc<TestAssembly>,
    pub fixtures: Vec<Fixture>,
}

impl TestCollection {
    pub fn new(assembly: Arc<TestAssembly>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let unique_id = unique_id::for_test_collection(&assembly.unique_id, &display_name);

        Self {
            unique_id,
            display_name,
            assembly,
            fixtures: Vec::new(),
        }
    }

    pub fn with_fixture(mut self, fixture: Fixture) -> Self {
        self.fixtures.push(fixture);
        self
    }
}

/// Test class; methods are grouped from its cases in first-appearance order
#[derive(Debug)]
pub struct TestClass {
    pub unique_id: String,
    pub name: String,
    pub collection: Arc<TestCollection>,
    /// Names of fixtures passed to each test, in order
    pub constructor_parameters: Vec<String>,
    pub fixtures: Vec<Fixture>,
    /// Runs after every test of the class
    pub test_cleanup: Option<Hook>,
}

impl TestClass {
    pub fn new(collection: Arc<TestCollection>, name: impl Into<String>) -> Self {
        let name = name.into();
        let unique_id = unique_id::for_test_class(&collection.unique_id, &name);

        Self {
            unique_id,
            name,
            collection,
            constructor_parameters: Vec::new(),
            fixtures: Vec::new(),
            test_cleanup: None,
        }
    }

    pub fn with_constructor_parameter(mut self, fixture_name: impl Into<String>) -> Self {
        self.constructor_parameters.push(fixture_name.into());
        self
    }

    pub fn with_fixture(mut self, fixture: Fixture) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn with_test_cleanup(mut self, hook: Hook) -> Self {
        self.test_cleanup = Some(hook);
        self
    }

    pub fn assembly(&self) -> &Arc<TestAssembly> {
        &self.collection.assembly
    }
}

#[derive(Debug)]
pub struct TestMethod {
    pub unique_id: String,
    pub name: String,
    pub class: Arc<TestClass>,
    pub parameter_names: Vec<String>,
    /// `None` for tests executed by an external engine
    pub body: Option<TestBody>,
}

impl TestMethod {
    pub fn new(class: Arc<TestClass>, name: impl Into<String>) -> Self {
        let name = name.into();
        let unique_id = unique_id::for_test_method(&class.unique_id, &name);

        Self {
            unique_id,
            name,
            class,
            parameter_names: Vec::new(),
            body: None,
        }
    }

    pub fn with_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_body(mut self, body: TestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// One invocable method/argument combination
#[derive(Debug, Clone)]
pub struct TestCase {
    pub unique_id: String,
    pub method: Arc<TestMethod>,
    pub display_name: String,
    pub skip_reason: Option<String>,
    /// Milliseconds; zero means no timeout
    pub timeout_ms: u64,
    pub arguments: Vec<ArgValue>,
    pub traits: Traits,
    pub source_information: Option<SourceInformation>,
}

impl TestCase {
    pub fn new(method: Arc<TestMethod>, arguments: Vec<ArgValue>) -> Self {
        let unique_id = unique_id::for_test_case(&method.unique_id, &arguments);
        let base = format!("{}.{}", method.class.name, method.name);
        let display_name = display_name_with_arguments(&base, &method.parameter_names, &arguments);

        Self {
            unique_id,
            method,
            display_name,
            skip_reason: None,
            timeout_ms: 0,
            arguments,
            traits: Traits::new(),
            source_information: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_traits(mut self, traits: Traits) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_source_information(mut self, source_information: SourceInformation) -> Self {
        self.source_information = Some(source_information);
        self
    }

    pub fn class(&self) -> &Arc<TestClass> {
        &self.method.class
    }

    pub fn collection(&self) -> &Arc<TestCollection> {
        &self.method.class.collection
    }

    pub fn assembly(&self) -> &Arc<TestAssembly> {
        &self.method.class.collection.assembly
    }
}

/// Render `Name(p1: v1, p2: v2)`; surplus arguments are labelled `???`
pub fn display_name_with_arguments(base: &str, parameter_names: &[String], arguments: &[ArgValue]) -> String {
    if arguments.is_empty() {
        return base.to_string();
    }

    let rendered: Vec<String> = arguments
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let name = parameter_names.get(index).map(String::as_str).unwrap_or("???");
            format!("{}: {}", name, value)
        })
        .collect();

    format!("{}({})", base, rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn method(name: &str) -> Arc<TestMethod> {
        let assembly = Arc::new(TestAssembly::new("Tests", Some("/bin/Tests.dll".into()), None));
        let collection = Arc::new(TestCollection::new(assembly, "Default collection"));
        let class = Arc::new(TestClass::new(collection, "Math.Tests"));
        Arc::new(TestMethod::new(class, name).with_parameters(["x", "y"]))
    }

    #[test]
    fn test_case_id_is_derived_from_identity() {
        let first = TestCase::new(method("Adds"), vec![json!(1), json!(2)]);
        let again = TestCase::new(method("Adds"), vec![json!(1), json!(2)]);
        let other = TestCase::new(method("Adds"), vec![json!(1), json!(3)]);

        assert_eq!(first.unique_id, again.unique_id);
        assert_ne!(first.unique_id, other.unique_id);
    }

    #[test]
    fn test_display_name_includes_arguments() {
        let case = TestCase::new(method("Adds"), vec![json!(1), json!("two"), json!(null)]);
        assert_eq!(case.display_name, "Math.Tests.Adds(x: 1, y: \"two\", ???: null)");

        let plain = TestCase::new(method("Adds"), Vec::new());
        assert_eq!(plain.display_name, "Math.Tests.Adds");
    }

    #[test]
    fn test_traits_preserve_value_order() {
        let mut traits = Traits::new();
        traits.add("Category", "slow");
        traits.add("Category", "db");
        traits.add("Owner", "ops");

        assert_eq!(traits.get("Category"), ["slow", "db"]);
        assert_eq!(traits.len(), 2);
        assert!(traits.get("Missing").is_empty());
    }

    #[test]
    fn test_output_collects_lines() {
        let output = TestOutput::default();
        output.write_line("first");
        output.clone().write_line("second");
        assert_eq!(output.contents(), "first\nsecond\n");
    }
}
