use crate::tools::Tool;

const CANNED_RESULT: &str = "Newcastle Temperature Yesterday. Maximum temperature yesterday: 56 °F (at 6:00 pm) Minimum temperature yesterday: 46 °F";

/// Placeholder search engine that answers every query with the same snippet.
#[derive(Debug, Clone, Default)]
pub struct SearchTool {
    canned: Option<String>,
}

impl SearchTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snippet returned for every query.
    pub fn with_canned_result(result: impl Into<String>) -> Self {
        Self {
            canned: Some(result.into()),
        }
    }
}

impl Tool for SearchTool {
    fn description(&self) -> &str {
        "a search engine. useful for when you need to answer questions about current events. input should be a search query.\n"
    }

    fn operate(&self, _input: &str) -> String {
        self.canned.as_deref().unwrap_or(CANNED_RESULT).to_string()
    }
}
