mod calculator;
mod search;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::ToolError;

pub use calculator::CalculatorTool;
pub use search::SearchTool;

/// Observation fed back to the model when it names a tool that is not registered.
pub const UNKNOWN_TOOL_OBSERVATION: &str = "error in reasoning";

/// A free-text-in, free-text-out capability the model can call.
///
/// `operate` never fails from the caller's point of view: problems are
/// reported as text, since the result goes straight back into the conversation.
pub trait Tool: Send + Sync {
    fn description(&self) -> &str;

    fn operate(&self, input: &str) -> String;
}

/// Registered tool name. Non-empty, without whitespace or control characters,
/// so it survives a round trip through an `Action:` line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolName(String);

impl ToolName {
    pub fn new(name: impl Into<String>) -> Result<Self, ToolError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ToolError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub enum Lookup<'a> {
    Found(&'a dyn Tool),
    NotFound,
}

impl fmt::Debug for Lookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Found(_) => f.write_str("Found"),
            Lookup::NotFound => f.write_str("NotFound"),
        }
    }
}

/// Name → tool mapping that remembers registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<(ToolName, Arc<dyn Tool>)>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, name: impl Into<String>, tool: T) -> Result<(), ToolError>
    where
        T: Tool + 'static,
    {
        self.register_shared(name, Arc::new(tool))
    }

    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        tool: Arc<dyn Tool>,
    ) -> Result<(), ToolError> {
        let name = ToolName::new(name)?;
        if !is_embeddable(tool.description()) {
            return Err(ToolError::InvalidDescription(name.0));
        }
        if self.index.contains_key(name.as_str()) {
            return Err(ToolError::Duplicate(name.0));
        }

        self.index.insert(name.0.clone(), self.tools.len());
        self.tools.push((name, tool));
        Ok(())
    }

    /// Case-sensitive exact match on the registered name.
    pub fn lookup(&self, name: &str) -> Lookup<'_> {
        match self.index.get(name) {
            Some(&idx) => Lookup::Found(self.tools[idx].1.as_ref()),
            None => Lookup::NotFound,
        }
    }

    /// Runs the named tool, or yields [`UNKNOWN_TOOL_OBSERVATION`] so the
    /// model gets a chance to correct itself.
    pub fn dispatch(&self, name: &str, input: &str) -> String {
        match self.lookup(name) {
            Lookup::Found(tool) => tool.operate(input),
            Lookup::NotFound => {
                warn!(action = name, "model requested an unregistered tool");
                UNKNOWN_TOOL_OBSERVATION.to_string()
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ToolName, &dyn Tool)> {
        self.tools.iter().map(|(name, tool)| (name, tool.as_ref()))
    }

    pub fn names(&self) -> impl Iterator<Item = &ToolName> {
        self.tools.iter().map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn is_embeddable(description: &str) -> bool {
    !description
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\t' | '\r'))
}

type ToolHandler = dyn Fn(&str) -> String + Send + Sync;

/// Tool backed by a closure.
#[derive(Clone)]
pub struct ToolSpec {
    description: String,
    handler: Arc<ToolHandler>,
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("description", &self.description)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            handler: Arc::new(|_input: &str| "tool handler not configured".to_string()),
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }
}

impl Tool for ToolSpec {
    fn description(&self) -> &str {
        &self.description
    }

    fn operate(&self, input: &str) -> String {
        (self.handler)(input)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn upper_tool() -> ToolSpec {
        ToolSpec::new("shouts the input\n").with_handler(|input| input.to_uppercase())
    }

    #[test]
    fn dispatch_runs_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register("upper", upper_tool()).expect("registers");

        assert_eq!(registry.dispatch("upper", "quiet"), "QUIET");
    }

    #[test]
    fn unknown_tool_yields_sentinel() {
        let mut registry = ToolRegistry::new();
        registry.register("upper", upper_tool()).expect("registers");

        assert_eq!(registry.dispatch("lookup", "anything"), "error in reasoning");
        assert_eq!(registry.dispatch("Upper", "case matters"), "error in reasoning");
        assert!(matches!(registry.lookup("lookup"), Lookup::NotFound));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register("upper", upper_tool()).expect("registers");

        let err = registry
            .register("upper", upper_tool())
            .expect_err("duplicate must fail");
        assert!(matches!(err, ToolError::Duplicate(name) if name == "upper"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_must_be_single_tokens() {
        assert!(ToolName::new("web search").is_err());
        assert!(ToolName::new("").is_err());
        assert!(ToolName::new("tab\tname").is_err());
        assert_eq!(ToolName::new("search").expect("valid").as_str(), "search");
    }

    #[test]
    fn descriptions_with_control_characters_are_rejected() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register("bell", ToolSpec::new("rings \u{7} the bell"))
            .expect_err("must fail");
        assert!(matches!(err, ToolError::InvalidDescription(_)));
    }

    #[test]
    fn iteration_follows_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register("zeta", upper_tool()).expect("registers");
        registry.register("alpha", upper_tool()).expect("registers");
        registry.register("mid", upper_tool()).expect("registers");

        let names = registry.names().map(ToolName::as_str).collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn tool_without_handler_reports_in_band() {
        assert_eq!(
            ToolSpec::new("nothing").operate("x"),
            "tool handler not configured"
        );
    }
}
