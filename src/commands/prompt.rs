//! Prompt command

use crate::config::Config;
use crate::prompts::{PromptTemplate, DEFAULT_USER_PROMPT};

/// The exact text `run` would feed the model
pub fn render_prompt(config: &Config, user_prompt: Option<&str>) -> String {
    PromptTemplate::new(config.system_prompt.as_str()).format(user_prompt.unwrap_or(DEFAULT_USER_PROMPT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_prompt() {
        let rendered = render_prompt(&Config::default(), None);
        assert!(rendered.starts_with("[INST] <<SYS>>\nYou are a helpful assistant"));
        assert!(rendered.ends_with("Count to ten [/INST]\n\n"));
    }

    #[test]
    fn test_render_uses_configured_system_prompt() {
        let config = Config {
            system_prompt: "Reply in haiku.".to_string(),
            ..Config::default()
        };
        let rendered = render_prompt(&config, Some("Describe Rust"));
        assert_eq!(
            rendered,
            "[INST] <<SYS>>\nReply in haiku.\n<</SYS>>\n\nDescribe Rust [/INST]\n\n"
        );
    }
}
