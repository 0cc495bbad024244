//! Prompt assembly
//!
//! Combines persona identity, retrieved context, operator results and
//! mode-specific behavioral instructions into the message list handed to
//! the LLM capability.

use crate::llm::ChatMessage;
use crate::memory::MemoryItem;
use crate::persona::PersonaProfile;
use crate::pipeline::types::{LayerContext, Mode};

/// Assembles generation prompts from persona + context + mode
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    /// New builder.
    pub fn new() -> Self {
        Self
    }

    /// Build the message list for one generation call.
    pub fn build(
        &self,
        persona: &PersonaProfile,
        memories: &[MemoryItem],
        ctx: &LayerContext,
    ) -> Vec<ChatMessage> {
        let mut system = String::new();

        system.push_str(&format!("You are {}.", persona.name));
        if !persona.traits.is_empty() {
            system.push_str(&format!(" Your traits: {}.", persona.traits.join(", ")));
        }
        if !persona.values.is_empty() {
            system.push_str(&format!(" Your core values: {}.", persona.values.join(", ")));
        }
        if !persona.goals.is_empty() {
            system.push_str(&format!(" Your current goals: {}.", persona.goals.join(", ")));
        }
        if !persona.communication_style.is_empty() {
            system.push_str(&format!(
                " Your communication style: {}.",
                persona.communication_style
            ));
        }

        system.push_str("\n\n");
        system.push_str(mode_instructions(ctx));

        if !memories.is_empty() {
            system.push_str("\n\nRelevant memories:\n");
            for memory in memories {
                system.push_str(&format!("- [{:?}] {}\n", memory.kind, memory.content));
            }
        }

        if let Some(operator_result) = &ctx.operator_result {
            system.push_str(&format!(
                "\nResults from tools/operators you may use in your answer:\n{}\n",
                serde_json::to_string_pretty(operator_result)
                    .unwrap_or_else(|_| operator_result.to_string())
            ));
        }

        let mut messages = vec![ChatMessage::system(system)];
        if let Some(reply_to) = &ctx.reply_to {
            messages.push(ChatMessage::user(format!(
                "(replying to: {})\n{}",
                reply_to, ctx.user_message
            )));
        } else {
            messages.push(ChatMessage::user(ctx.user_message.clone()));
        }
        messages
    }
}

fn mode_instructions(ctx: &LayerContext) -> &'static str {
    match ctx.mode {
        Mode::Dual => {
            "Draw on both your long-term history and your recent experience. \
             You may reference your inner reflections when they are relevant."
        }
        Mode::Agent => {
            "Answer the request directly and concisely. \
             Stay on task and do not speculate beyond what was asked."
        }
        Mode::Emulation => {
            "You are replaying a historical snapshot of this personality. \
             Never claim memories or events from after that snapshot; \
             if asked about anything newer, say you do not know about it yet."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSnapshot;
    use crate::memory::MemoryKind;
    use crate::pipeline::types::PipelineInput;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn ctx(mode: Mode, input: PipelineInput) -> LayerContext {
        LayerContext::new(
            mode,
            &input,
            Arc::new(ConfigSnapshot::defaults()),
            CancellationToken::new(),
        )
    }

    fn persona() -> PersonaProfile {
        let mut p = PersonaProfile::named("Ada");
        p.traits = vec!["curious".to_string()];
        p.values = vec!["honesty".to_string()];
        p.goals = vec!["finish the garden journal".to_string()];
        p.communication_style = "warm".to_string();
        p
    }

    #[test]
    fn test_system_prompt_includes_identity() {
        let builder = PromptBuilder::new();
        let messages = builder.build(
            &persona(),
            &[],
            &ctx(Mode::Dual, PipelineInput::from_message("hi")),
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("You are Ada."));
        assert!(messages[0].content.contains("honesty"));
        assert!(messages[0].content.contains("garden journal"));
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn test_memories_folded_in() {
        let builder = PromptBuilder::new();
        let memories = vec![MemoryItem {
            kind: MemoryKind::Reflection,
            id: "m1".to_string(),
            content: "felt proud of the tomatoes".to_string(),
            score: 0.9,
        }];
        let messages = builder.build(
            &persona(),
            &memories,
            &ctx(Mode::Dual, PipelineInput::from_message("how's the garden")),
        );
        assert!(messages[0].content.contains("Relevant memories:"));
        assert!(messages[0].content.contains("felt proud of the tomatoes"));
    }

    #[test]
    fn test_emulation_forbids_new_memories() {
        let builder = PromptBuilder::new();
        let messages = builder.build(
            &persona(),
            &[],
            &ctx(Mode::Emulation, PipelineInput::from_message("hi")),
        );
        assert!(messages[0]
            .content
            .contains("Never claim memories or events from after that snapshot"));
    }

    #[test]
    fn test_operator_result_and_reply_to() {
        let builder = PromptBuilder::new();
        let input = PipelineInput {
            user_message: "and then?".to_string(),
            reply_to: Some("we talked about compost".to_string()),
            operator_result: Some(serde_json::json!({"weather": "rainy"})),
            ..Default::default()
        };
        let messages = builder.build(&persona(), &[], &ctx(Mode::Agent, input));
        assert!(messages[0].content.contains("\"weather\": \"rainy\""));
        assert!(messages[1].content.contains("replying to: we talked about compost"));
    }
}
