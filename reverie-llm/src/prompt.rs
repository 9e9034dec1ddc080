//! Prompt templates for the engine's language-model calls.
//!
//! Each template pairs with one [`reverie_core::LanguageModel`] method.
//! `{key}` placeholders are filled by [`render_template`].

/// Importance rating (single integer, 1–10).
pub const IMPORTANCE_SYSTEM: &str = r"You rate how memorable events are for a character in a simulated world.
Respond with a single integer and nothing else.";

pub const IMPORTANCE_USER: &str = r"On a scale of 1 to 10, where 1 is purely mundane (brushing teeth, walking a familiar path) and 10 is extraordinary (a betrayal, a brush with death, falling in love), rate the likely importance of the following memory:

{memory_text}

Rating:";

/// Consolidation summary (one first-person paragraph).
pub const CONSOLIDATION_SYSTEM: &str = r"You compress a character's related memories into one concise summary.
Write a single first-person paragraph. Preserve names, places, and the overall feeling. Do not invent details.";

pub const CONSOLIDATION_USER: &str = r"Combine these related memories into a single concise summary paragraph:

{memories}";

/// Reflection questions (JSON array of 3 strings).
pub const QUESTIONS_SYSTEM: &str = r#"You surface what is worth thinking about in a character's recent experience.
Respond with a JSON array of exactly 3 strings, e.g. ["...", "...", "..."]. No other text."#;

pub const QUESTIONS_USER: &str = r"{character_name}'s recent memories:
{statements}

Given only the statements above, what are the 3 most salient high-level questions we can answer about the subjects in the statements?";

/// Reflection insights (JSON array of 3 strings).
pub const INSIGHTS_SYSTEM: &str = r#"You distill a character's memories into the insights they would actually draw.
Write in first person as the character. Respond with a JSON array of exactly 3 strings. No other text."#;

pub const INSIGHTS_USER: &str = r"You are {character_name}. You have been wondering:
{questions}

Relevant memories:
{context}

What 3 high-level insights can you infer from the memories above?";

/// Simple template interpolation: replaces `{key}` with its value.
/// Unknown placeholders are left as-is.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}
