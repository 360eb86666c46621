use crate::tools::{ToolName, ToolRegistry};

const PREAMBLE: &str =
    "Answer the following questions as best you can. You have access to the following tools:\n";

/// Renders the opening user turn: instructions, tool catalogue, the
/// Thought/Action/Observation grammar, the question and a `Thought: ` cue.
///
/// Output depends only on the registry contents and `question`.
pub fn build_prompt(registry: &ToolRegistry, question: &str) -> String {
    let mut prompt = String::from(PREAMBLE);

    for (name, tool) in registry.iter() {
        prompt.push_str(name.as_str());
        prompt.push_str(": ");
        prompt.push_str(tool.description());
    }

    let tool_names = registry
        .names()
        .map(ToolName::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    prompt.push_str(&format!(
        "\nUse the following format:\n\n\
         Question: the input question you must answer\n\
         Thought: you should always think about what to do\n\
         Action: the action to take, should be one of [{tool_names}]\n\
         Action Input: the input to the action\n\
         Observation: the result of the action\n\
         ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
         Thought: I now know the final answer\n\
         Final Answer: the final answer to the original input question\n\n\
         Begin!\n"
    ));

    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt.push('\n');
    prompt.push_str("Thought: ");

    prompt
}
