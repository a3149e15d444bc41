//! Tool modules — the unit a bundle contributes its tools through.

use std::sync::Arc;

use crate::error::Result;
use crate::manifest::BundleDescriptor;

use super::base::Tool;

/// Produces the tools of one bundle.
///
/// Called on every scan; a failure drops only that bundle's tools.
pub trait ToolModule: Send + Sync {
    fn load(&self, bundle: &BundleDescriptor) -> Result<Vec<Arc<dyn Tool>>>;
}

/// A module backed by in-process Rust tools.
#[derive(Clone, Default)]
pub struct NativeToolModule {
    tools: Vec<Arc<dyn Tool>>,
}

impl NativeToolModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool (builder style).
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }
}

impl ToolModule for NativeToolModule {
    fn load(&self, _bundle: &BundleDescriptor) -> Result<Vec<Arc<dyn Tool>>> {
        Ok(self.tools.clone())
    }
}

impl std::fmt::Debug for NativeToolModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("NativeToolModule").field("tools", &names).finish()
    }
}
