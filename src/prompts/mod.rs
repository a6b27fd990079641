//! System Prompts Module
//!
//! Llama-2 chat instruction template and the default prompts.


/// Begin-instruction marker
pub const B_INST: &str = "[INST]";
/// End-instruction marker
pub const E_INST: &str = "[/INST]";
/// Begin-system marker (includes its trailing newline)
pub const B_SYS: &str = "<<SYS>>\n";
/// End-system marker (includes the blank line before the user turn)
pub const E_SYS: &str = "\n<</SYS>>\n\n";

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that provides accurate and concise responses";

/// User prompt used by `run` when none is given on the command line
pub const DEFAULT_USER_PROMPT: &str = "Count to ten";

/// Wrap a user request in the Llama-2 chat template.
///
/// Both inputs are trimmed. No validation is performed: a prompt that
/// itself contains delimiter text is passed through untouched.
pub fn format_prompt(system_prompt: &str, user_prompt: &str) -> String {
    format!(
        "{B_INST} {B_SYS}{}{E_SYS}{} {E_INST}\n\n",
        system_prompt.trim(),
        user_prompt.trim()
    )
}

/// A system prompt bound to the chat template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system_prompt: String,
}

impl PromptTemplate {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Format a user request with this template's system prompt
    pub fn format(&self, user_prompt: &str) -> String {
        format_prompt(&self.system_prompt, user_prompt)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}
