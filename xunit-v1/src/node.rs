//! Result documents produced by legacy engines
//!
//! Legacy engines report discovery and execution as trees of named nodes with
//! string attributes, e.g. an `assembly` node containing `class` nodes
//! containing `method` or `test` nodes.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<LegacyNode>,
    pub text: Option<String>,
}

impl LegacyNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: LegacyNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&LegacyNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LegacyNode> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Text of a direct child, if present
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|child| child.text.as_deref())
    }

    /// Every descendant with the given name, depth first, in document order
    pub fn descendants(&self, name: &str) -> Vec<&LegacyNode> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a LegacyNode>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendants_in_document_order() {
        let document = LegacyNode::new("assembly")
            .with_child(
                LegacyNode::new("class")
                    .with_attribute("name", "A")
                    .with_child(LegacyNode::new("method").with_attribute("method", "One"))
                    .with_child(LegacyNode::new("method").with_attribute("method", "Two")),
            )
            .with_child(
                LegacyNode::new("class")
                    .with_attribute("name", "B")
                    .with_child(LegacyNode::new("method").with_attribute("method", "Three")),
            );

        let names: Vec<_> = document
            .descendants("method")
            .into_iter()
            .filter_map(|node| node.attr("method"))
            .collect();
        assert_eq!(names, vec!["One", "Two", "Three"]);
        assert_eq!(document.children_named("class").count(), 2);
    }

    #[test]
    fn test_child_text() {
        let failure = LegacyNode::new("failure").with_child(LegacyNode::new("message").with_text("boom"));
        assert_eq!(failure.child_text("message"), Some("boom"));
        assert_eq!(failure.child_text("stack-trace"), None);
    }
}
