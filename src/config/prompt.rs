use serde::Deserialize;
use std::fs;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;

use crate::classify::QueryClass;
use crate::error::AgentError;
use crate::rag::Fragment;

const CONTEXT_PLACEHOLDER: &str = "{context}";

fn default_general_templates() -> Vec<String> {
    vec![
        "You are a friendly and helpful assistant. Engage in natural conversation while providing accurate information.".to_string(),
        "As an AI assistant, your goal is to be helpful and informative while maintaining a casual, human-like tone.".to_string(),
        "You're here to assist users with their questions. Be friendly, concise, and natural in your responses.".to_string()
    ]
}

fn default_no_info_templates() -> Vec<String> {
    vec![
        "I don't have specific information about that. Could you provide more context or ask something else?".to_string(),
        "I'm not sure I have the right information to answer that. Can you rephrase or ask a different question?".to_string(),
        "That's an interesting question, but I don't have enough details to give a proper answer. Could you clarify or ask something else?".to_string()
    ]
}

fn default_grounded_template() -> String {
    format!(
        "You are a knowledgeable assistant with expertise in job markets and career information. \
         Respond to the user's query using your knowledge, but do so in a natural, conversational manner. \
         If you're not certain about something, it's okay to express uncertainty. \
         Here's some relevant information to consider: {}",
        CONTEXT_PLACEHOLDER
    )
}

/// System prompt templates. Built-in defaults, overridable from a JSON file.
///
/// Selection among the synonymous general/no-info phrasings is a round-robin
/// over an atomic cursor rather than a random pick, so every template still
/// rotates into use while tests stay deterministic.
#[derive(Debug, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_general_templates")]
    pub general_templates: Vec<String>,
    #[serde(default = "default_no_info_templates")]
    pub no_info_templates: Vec<String>,
    #[serde(default = "default_grounded_template")]
    pub grounded_template: String,
    #[serde(skip)]
    cursor: AtomicUsize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            general_templates: default_general_templates(),
            no_info_templates: default_no_info_templates(),
            grounded_template: default_grounded_template(),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), AgentError> {
        if self.general_templates.is_empty() {
            return Err(AgentError::Config("prompts: general_templates is empty".to_string()));
        }
        if self.no_info_templates.is_empty() {
            return Err(AgentError::Config("prompts: no_info_templates is empty".to_string()));
        }
        if !self.grounded_template.contains(CONTEXT_PLACEHOLDER) {
            return Err(
                AgentError::Config(
                    format!(
                        "prompts: grounded_template is missing the {} placeholder",
                        CONTEXT_PLACEHOLDER
                    )
                )
            );
        }
        Ok(())
    }

    fn pick<'a>(&self, templates: &'a [String]) -> &'a str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % templates.len();
        templates[idx].as_str()
    }
}

/// Load prompt templates from a JSON file, or fall back to the built-ins when
/// no path is configured.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, AgentError> {
    let config = match path {
        Some(p) => {
            let file_content = fs
                ::read_to_string(p)
                .map_err(|e|
                    AgentError::Config(format!("Failed to read prompts file '{}': {}", p, e))
                )?;
            serde_json
                ::from_str::<PromptConfig>(&file_content)
                .map_err(|e|
                    AgentError::Config(format!("Failed to parse prompts file '{}': {}", p, e))
                )?
        }
        None => PromptConfig::default(),
    };
    config.validate()?;
    Ok(Arc::new(config))
}

/// Build the single system instruction for one turn.
///
/// `General` turns get a conversational template. `Specific` turns get the
/// grounding template with all fragment texts interpolated in retriever order
/// joined by single spaces, or the no-info fallback when retrieval came back
/// empty. Never touches stored history.
pub fn compose_system_prompt(
    config: &PromptConfig,
    class: QueryClass,
    fragments: &[Fragment]
) -> String {
    match class {
        QueryClass::General => config.pick(&config.general_templates).to_string(),
        QueryClass::Specific if fragments.is_empty() => {
            config.pick(&config.no_info_templates).to_string()
        }
        QueryClass::Specific => {
            let context = fragments
                .iter()
                .map(|f| f.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            config.grounded_template.replace(CONTEXT_PLACEHOLDER, &context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str) -> Fragment {
        Fragment { text: text.to_string(), score: 0.9 }
    }

    #[test]
    fn general_uses_conversational_template() {
        let config = PromptConfig::default();
        let prompt = compose_system_prompt(&config, QueryClass::General, &[]);
        assert!(config.general_templates.contains(&prompt));
    }

    #[test]
    fn general_rotates_through_templates() {
        let config = PromptConfig::default();
        let first = compose_system_prompt(&config, QueryClass::General, &[]);
        let second = compose_system_prompt(&config, QueryClass::General, &[]);
        assert_ne!(first, second);
    }

    #[test]
    fn specific_with_fragments_joins_in_order() {
        let config = PromptConfig::default();
        let fragments = vec![
            fragment("Backend devs in Austin earn $95k-$120k."),
            fragment("Demand is high in Austin's tech corridor.")
        ];
        let prompt = compose_system_prompt(&config, QueryClass::Specific, &fragments);
        assert!(
            prompt.contains(
                "Backend devs in Austin earn $95k-$120k. Demand is high in Austin's tech corridor."
            )
        );
        assert!(!prompt.contains(CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn specific_without_fragments_uses_no_info_fallback() {
        let config = PromptConfig::default();
        let prompt = compose_system_prompt(&config, QueryClass::Specific, &[]);
        assert!(config.no_info_templates.contains(&prompt));
        assert!(!prompt.contains("relevant information to consider"));
    }

    #[test]
    fn grounded_template_requires_placeholder() {
        let config = PromptConfig {
            grounded_template: "no placeholder here".to_string(),
            ..PromptConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
