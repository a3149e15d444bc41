//! The immutable catalog of bundles and their tools.

use std::collections::HashMap;
use std::sync::Arc;

use skillbot_core::types::ToolDefinition;
use tracing::warn;

use crate::manifest::BundleDescriptor;
use crate::tools::Tool;

/// Schema and ownership of one tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub tool_name: String,
    /// OpenAI function-calling schema.
    pub schema: ToolDefinition,
    /// Name of the bundle that contributed the tool.
    pub owning_bundle: String,
}

/// A tool spec together with its callable.
#[derive(Clone)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub callable: Arc<dyn Tool>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool").field("spec", &self.spec).finish()
    }
}

/// Bundles (in catalog order) and tools, published as an `Arc<Catalog>`.
///
/// Never mutated after publication; a reload builds a new one.
#[derive(Debug, Default)]
pub struct Catalog {
    bundles: Vec<BundleDescriptor>,
    bundle_index: HashMap<String, usize>,
    tools: Vec<RegisteredTool>,
    tool_index: HashMap<String, usize>,
    defaults: Vec<String>,
    diagnostics: Vec<String>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All bundles in catalog order.
    pub fn bundles(&self) -> &[BundleDescriptor] {
        &self.bundles
    }

    pub fn bundle(&self, name: &str) -> Option<&BundleDescriptor> {
        self.bundle_index.get(name).map(|&i| &self.bundles[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bundle_index.contains_key(name)
    }

    /// Position of a bundle in catalog order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.bundle_index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// All tools in registration order.
    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tool_index.get(name).map(|&i| &self.tools[i])
    }

    /// Tools owned by `bundle`, in registration order.
    pub fn tools_of<'a>(&'a self, bundle: &'a str) -> impl Iterator<Item = &'a RegisteredTool> + 'a {
        self.tools.iter().filter(move |t| t.spec.owning_bundle == bundle)
    }

    /// The configured default skill set (may name unknown bundles).
    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Problems found while building this catalog (skipped bundles, tool load failures).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub(crate) fn set_defaults(&mut self, defaults: Vec<String>) {
        self.defaults = defaults
            .into_iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: Vec<String>) {
        self.diagnostics = diagnostics;
    }

    /// Insert a bundle; a bundle with the same name is replaced in place.
    ///
    /// Returns the replaced descriptor.
    pub(crate) fn upsert_bundle(&mut self, bundle: BundleDescriptor) -> Option<BundleDescriptor> {
        match self.bundle_index.get(&bundle.name) {
            Some(&i) => Some(std::mem::replace(&mut self.bundles[i], bundle)),
            None => {
                self.bundle_index.insert(bundle.name.clone(), self.bundles.len());
                self.bundles.push(bundle);
                None
            }
        }
    }

    /// Register a tool for `bundle`. The first tool with a given name wins.
    pub(crate) fn register_tool(&mut self, bundle: &str, callable: Arc<dyn Tool>) -> bool {
        let schema = callable.to_definition();
        let tool_name = schema.name().to_string();

        if let Some(existing) = self.tool(&tool_name) {
            warn!(
                tool = %tool_name,
                kept = %existing.spec.owning_bundle,
                dropped = %bundle,
                "tool name collision, keeping first registration"
            );
            return false;
        }

        self.tool_index.insert(tool_name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            spec: ToolSpec {
                tool_name,
                schema,
                owning_bundle: bundle.to_string(),
            },
            callable,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest;
    use crate::tools::ToolArgs;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str { self.0 }
        fn description(&self) -> &str { "test" }
        fn parameters(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _args: ToolArgs) -> anyhow::Result<Value> { Ok(Value::Null) }
    }

    fn bundle(name: &str, body: &str) -> BundleDescriptor {
        parse_manifest(&format!("---\nname: {name}\n---\n{body}")).unwrap()
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut c = Catalog::empty();
        c.upsert_bundle(bundle("a", "one"));
        c.upsert_bundle(bundle("b", "two"));
        let old = c.upsert_bundle(bundle("a", "three")).unwrap();

        assert_eq!(old.body, "one");
        assert_eq!(c.position("a"), Some(0));
        assert_eq!(c.bundle("a").unwrap().body, "three");
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_tool_collision_first_wins() {
        let mut c = Catalog::empty();
        assert!(c.register_tool("a", Arc::new(Named("get_time"))));
        assert!(!c.register_tool("b", Arc::new(Named("get_time"))));
        assert!(c.register_tool("b", Arc::new(Named("other"))));

        assert_eq!(c.tool("get_time").unwrap().spec.owning_bundle, "a");
        assert_eq!(c.tools_of("b").count(), 1);
    }

    #[test]
    fn test_defaults_normalized() {
        let mut c = Catalog::empty();
        c.set_defaults(vec![" Shell ".into(), "".into()]);
        assert_eq!(c.defaults(), ["shell"]);
    }
}
