use tracing::debug;

use super::composer::MergedContext;
use crate::config::PromptsConfig;
use crate::models::ChatMessage;

pub const LONG_TERM_PLACEHOLDER: &str = "{long_term_memory}";

/// Turns a merged context plus the new input into the message list for the model.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_templates: Vec<String>,
}

impl ContextBuilder {
    pub fn new(system_templates: Vec<String>) -> Self {
        Self { system_templates }
    }

    pub fn from_config(prompts: &PromptsConfig) -> Self {
        Self::new(prompts.system.clone())
    }

    pub fn system_templates(&self) -> &[String] {
        &self.system_templates
    }

    /// System prompts, then history in recorded order, then the new input.
    pub fn build_messages(&self, context: &MergedContext, input: &str) -> Vec<ChatMessage> {
        let long_term = context.long_term_text();
        let mut messages =
            Vec::with_capacity(self.system_templates.len() + context.short_term.len() + 1);

        for template in &self.system_templates {
            messages.push(ChatMessage::system(
                template.replace(LONG_TERM_PLACEHOLDER, &long_term),
            ));
        }
        messages.extend(context.short_term.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(input));

        debug!(
            system = self.system_templates.len(),
            history = context.short_term.len(),
            passages = context.long_term.len(),
            "Built model messages"
        );
        messages
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::from_config(&PromptsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Turn;
    use crate::services::conversation::{MemoryComposer, Passage};

    #[test]
    fn test_message_order() {
        let builder = ContextBuilder::new(vec![
            "be polite".to_string(),
            "context: {long_term_memory}".to_string(),
        ]);
        let context = MemoryComposer::merge(
            vec![Turn::human("my name is Ana"), Turn::assistant("noted")],
            vec![Passage::new("alpha"), Passage::new("beta")],
        );

        let messages = builder.build_messages(&context, "what is my name?");

        assert_eq!(
            messages,
            vec![
                ChatMessage::system("be polite"),
                ChatMessage::system("context: alpha\n\nbeta"),
                ChatMessage::user("my name is Ana"),
                ChatMessage::assistant("noted"),
                ChatMessage::user("what is my name?"),
            ]
        );
    }

    #[test]
    fn test_empty_long_term_leaves_blank_slot() {
        let builder = ContextBuilder::new(vec!["ctx: {long_term_memory}".to_string()]);
        let messages = builder.build_messages(&MergedContext::default(), "hi");
        assert_eq!(messages[0], ChatMessage::system("ctx: "));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_default_templates_include_placeholder() {
        let builder = ContextBuilder::default();
        assert!(builder
            .system_templates()
            .iter()
            .any(|t| t.contains(LONG_TERM_PLACEHOLDER)));
    }
}
