use crate::llm::Message;

const ACTION_PREFIX: &str = "Action: ";
const ACTION_INPUT_PREFIX: &str = "Action Input: ";

/// Tool directive found in one assistant turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedAction {
    pub action: Option<String>,
    pub input: Option<String>,
}

impl ParsedAction {
    /// A turn without an `Action:` line is a final answer.
    pub fn is_terminal(&self) -> bool {
        self.action.is_none()
    }
}

/// Scans `message` line by line for `Action:` and `Action Input:` directives.
///
/// Each line is trimmed before matching. When a directive appears more than
/// once, the last occurrence wins. The action name is the rest of the line
/// after the prefix, trimmed; the input is the rest of the line verbatim.
pub fn parse_action(message: &Message) -> ParsedAction {
    let mut parsed = ParsedAction::default();

    for line in message.content().split('\n') {
        let line = line.trim();
        if let Some(action) = line.strip_prefix(ACTION_PREFIX) {
            parsed.action = Some(action.trim().to_string());
        }
        if let Some(input) = line.strip_prefix(ACTION_INPUT_PREFIX) {
            parsed.input = Some(input.to_string());
        }
    }

    parsed
}
