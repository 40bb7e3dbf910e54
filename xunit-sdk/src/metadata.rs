//! Attribute metadata and test case construction
//!
//! Discovery mechanics live outside this crate. What arrives here is a
//! [`MetadataInspector`] that can list the attributes of an assembly, class or
//! method, and a [`TestCaseFactory`] that turns a method plus its attributes
//! into a fully described [`TestCase`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::bus::MessageSink;
use crate::error::DiscoveryError;
use crate::messages::DiagnosticMessage;
use crate::model::{display_name_with_arguments, ArgValue, SourceInformation, TestCase, TestMethod, Traits};

/// Attribute kind marking an invocable test method
pub const FACT_ATTRIBUTE: &str = "Fact";

/// Attribute kind contributing traits
pub const TRAIT_ATTRIBUTE: &str = "Trait";

/// Name under which [`KeyValueTraitDiscoverer`] is registered by default
pub const DEFAULT_TRAIT_DISCOVERER: &str = "TraitDiscoverer";

/// One attribute instance as seen by the inspector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub attribute_type: String,
    pub constructor_arguments: Vec<ArgValue>,
    pub named_arguments: BTreeMap<String, ArgValue>,
    /// Trait discoverer declared on the attribute's type, if any
    pub trait_discoverer: Option<String>,
}

impl AttributeInfo {
    pub fn new(attribute_type: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            ..Self::default()
        }
    }

    pub fn with_constructor_argument(mut self, value: impl Into<ArgValue>) -> Self {
        self.constructor_arguments.push(value.into());
        self
    }

    pub fn with_named_argument(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.named_arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_trait_discoverer(mut self, discoverer: impl Into<String>) -> Self {
        self.trait_discoverer = Some(discoverer.into());
        self
    }

    pub fn named_argument(&self, name: &str) -> Option<&ArgValue> {
        self.named_arguments.get(name).filter(|value| !value.is_null())
    }

    pub fn named_str(&self, name: &str) -> Option<&str> {
        self.named_argument(name).and_then(ArgValue::as_str)
    }
}

/// Element whose attributes are being inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTarget<'a> {
    Assembly { name: &'a str },
    Class { name: &'a str },
    Method { class_name: &'a str, name: &'a str },
}

impl AttributeTarget<'_> {
    pub fn name(&self) -> &str {
        match self {
            AttributeTarget::Assembly { name }
            | AttributeTarget::Class { name }
            | AttributeTarget::Method { name, .. } => name,
        }
    }
}

/// Capability to read attribute metadata
pub trait MetadataInspector: Send + Sync {
    /// Attributes of `kind` applied to `target`, in declaration order
    fn attributes(&self, target: AttributeTarget<'_>, kind: &str) -> Vec<AttributeInfo>;

    fn display_name(&self, target: AttributeTarget<'_>) -> String {
        target.name().to_string()
    }
}

/// Turns a trait attribute into key/value pairs
pub trait TraitDiscoverer: Send + Sync {
    fn traits(&self, attribute: &AttributeInfo) -> Vec<(String, String)>;
}

/// Reads `(name, value)` from the attribute's constructor arguments
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyValueTraitDiscoverer;

impl TraitDiscoverer for KeyValueTraitDiscoverer {
    fn traits(&self, attribute: &AttributeInfo) -> Vec<(String, String)> {
        let text = |value: &ArgValue| match value {
            ArgValue::String(text) => text.clone(),
            other => other.to_string(),
        };

        match attribute.constructor_arguments.as_slice() {
            [name, value, ..] => vec![(text(name), text(value))],
            _ => Vec::new(),
        }
    }
}

/// Trait discoverers available to a discovery session
#[derive(Clone)]
pub struct TraitDiscovererRegistry {
    discoverers: HashMap<String, Arc<dyn TraitDiscoverer>>,
}

impl TraitDiscovererRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_TRAIT_DISCOVERER, Arc::new(KeyValueTraitDiscoverer));
        registry
    }

    pub fn empty() -> Self {
        Self {
            discoverers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, discoverer: Arc<dyn TraitDiscoverer>) {
        self.discoverers.insert(name.into(), discoverer);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TraitDiscoverer>> {
        self.discoverers.get(name)
    }
}

impl Default for TraitDiscovererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-scoped cache of assembly- and class-level trait attributes.
///
/// Keys are case-insensitive. Each key is computed at most once; concurrent
/// callers for the same key wait for the first computation and share it.
#[derive(Debug, Default)]
pub struct TraitAttributeCache {
    assemblies: DashMap<String, Arc<[AttributeInfo]>>,
    types: DashMap<String, Arc<[AttributeInfo]>>,
}

impl TraitAttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    fn get_or_compute(
        map: &DashMap<String, Arc<[AttributeInfo]>>,
        name: &str,
        compute: impl FnOnce() -> Vec<AttributeInfo>,
    ) -> Arc<[AttributeInfo]> {
        // the entry guard holds the shard lock while computing
        map.entry(Self::key(name))
            .or_insert_with(|| compute().into())
            .clone()
    }

    pub fn assembly_attributes(
        &self,
        assembly_name: &str,
        compute: impl FnOnce() -> Vec<AttributeInfo>,
    ) -> Arc<[AttributeInfo]> {
        Self::get_or_compute(&self.assemblies, assembly_name, compute)
    }

    pub fn type_attributes(&self, type_name: &str, compute: impl FnOnce() -> Vec<AttributeInfo>) -> Arc<[AttributeInfo]> {
        Self::get_or_compute(&self.types, type_name, compute)
    }

    pub fn len(&self) -> usize {
        self.assemblies.len() + self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How default display names are formed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodDisplay {
    #[default]
    ClassAndMethod,
    Method,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub method_display: MethodDisplay,
    pub include_source_information: bool,
}

/// Values that take precedence over the Fact attribute
#[derive(Debug, Clone, Default)]
pub struct TestCaseOverrides {
    pub display_name: Option<String>,
    pub skip_reason: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Best-effort source location lookup
pub trait SourceInformationProvider: Send + Sync {
    fn source_information(&self, class_name: &str, method_name: &str) -> SourceInformation;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSourceInformationProvider;

impl SourceInformationProvider for NullSourceInformationProvider {
    fn source_information(&self, _class_name: &str, _method_name: &str) -> SourceInformation {
        SourceInformation::default()
    }
}

/// Builds test cases from methods decorated with a Fact attribute
pub struct TestCaseFactory<'a> {
    inspector: &'a dyn MetadataInspector,
    cache: &'a TraitAttributeCache,
    discoverers: &'a TraitDiscovererRegistry,
    options: DiscoveryOptions,
    diagnostics: Option<&'a dyn MessageSink>,
    source_provider: Option<&'a dyn SourceInformationProvider>,
}

impl<'a> TestCaseFactory<'a> {
    pub fn new(
        inspector: &'a dyn MetadataInspector,
        cache: &'a TraitAttributeCache,
        discoverers: &'a TraitDiscovererRegistry,
        options: DiscoveryOptions,
    ) -> Self {
        Self {
            inspector,
            cache,
            discoverers,
            options,
            diagnostics: None,
            source_provider: None,
        }
    }

    /// Send diagnostic messages to `sink`
    pub fn with_diagnostics(mut self, sink: &'a dyn MessageSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn with_source_provider(mut self, provider: &'a dyn SourceInformationProvider) -> Self {
        self.source_provider = Some(provider);
        self
    }

    pub fn create(
        &self,
        method: Arc<TestMethod>,
        arguments: Vec<ArgValue>,
        overrides: TestCaseOverrides,
    ) -> Result<TestCase, DiscoveryError> {
        let class_name = method.class.name.as_str();
        let method_target = AttributeTarget::Method {
            class_name,
            name: &method.name,
        };

        let fact = self
            .inspector
            .attributes(method_target, FACT_ATTRIBUTE)
            .into_iter()
            .next()
            .ok_or_else(|| DiscoveryError::missing_fact_attribute(class_name, &method.name))?;

        let base_display_name = overrides
            .display_name
            .or_else(|| fact.named_str("DisplayName").map(str::to_string))
            .unwrap_or_else(|| self.default_display_name(&method));
        let display_name = display_name_with_arguments(&base_display_name, &method.parameter_names, &arguments);

        let skip_reason = overrides
            .skip_reason
            .or_else(|| fact.named_str("Skip").map(str::to_string));

        let timeout_ms = match overrides.timeout_ms {
            Some(timeout_ms) => timeout_ms,
            None => match fact.named_argument("Timeout") {
                None => 0,
                Some(value) => value.as_u64().ok_or_else(|| {
                    DiscoveryError::invalid_attribute_argument(
                        class_name,
                        &method.name,
                        "Timeout",
                        format!("expected a non-negative integer, found {}", value),
                    )
                })?,
            },
        };

        let mut traits = Traits::new();
        for attribute in self.trait_attributes(&method).iter() {
            match &attribute.trait_discoverer {
                Some(name) => match self.discoverers.get(name) {
                    Some(discoverer) => {
                        for (key, value) in discoverer.traits(attribute) {
                            traits.add(key, value);
                        }
                    }
                    None => debug!("Trait discoverer '{}' is not registered", name),
                },
                None => self.diagnostic(format!(
                    "Trait attribute on '{}' did not have [TraitDiscoverer]",
                    display_name
                )),
            }
        }

        let mut test_case = TestCase::new(method.clone(), arguments)
            .with_display_name(display_name)
            .with_timeout_ms(timeout_ms)
            .with_traits(traits);

        if let Some(reason) = skip_reason {
            test_case = test_case.with_skip_reason(reason);
        }

        if self.options.include_source_information {
            if let Some(provider) = self.source_provider {
                let source = provider.source_information(class_name, &method.name);
                if !source.is_empty() {
                    test_case = test_case.with_source_information(source);
                }
            }
        }

        Ok(test_case)
    }

    fn default_display_name(&self, method: &TestMethod) -> String {
        let method_name = self.inspector.display_name(AttributeTarget::Method {
            class_name: &method.class.name,
            name: &method.name,
        });

        match self.options.method_display {
            MethodDisplay::Method => method_name,
            MethodDisplay::ClassAndMethod => {
                let class_name = self.inspector.display_name(AttributeTarget::Class {
                    name: &method.class.name,
                });
                format!("{}.{}", class_name, method_name)
            }
        }
    }

    /// Assembly traits, then method traits, then class traits
    fn trait_attributes(&self, method: &TestMethod) -> Vec<AttributeInfo> {
        let assembly_name = method.class.assembly().name.as_str();
        let class_name = method.class.name.as_str();

        let assembly = self.cache.assembly_attributes(assembly_name, || {
            self.inspector
                .attributes(AttributeTarget::Assembly { name: assembly_name }, TRAIT_ATTRIBUTE)
        });
        let on_method = self.inspector.attributes(
            AttributeTarget::Method {
                class_name,
                name: &method.name,
            },
            TRAIT_ATTRIBUTE,
        );
        let on_class = self.cache.type_attributes(class_name, || {
            self.inspector
                .attributes(AttributeTarget::Class { name: class_name }, TRAIT_ATTRIBUTE)
        });

        assembly
            .iter()
            .cloned()
            .chain(on_method)
            .chain(on_class.iter().cloned())
            .collect()
    }

    fn diagnostic(&self, message: String) {
        debug!("{}", message);
        if let Some(sink) = self.diagnostics {
            sink.on_message(&DiagnosticMessage { message }.into());
        }
    }
}
