//! Prompt builder for rendering templates and packing retrieved context.

use crate::types::{BuiltPrompt, PromptDefinition};
use docqa_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Separator placed between passages in the context block.
const PASSAGE_SEPARATOR: &str = "\n\n";

/// Build an answer prompt whose system and user messages together stay within
/// `max_chars`.
///
/// This function:
/// 1. Measures the overhead of the system message plus the template rendered
///    with an empty context
/// 2. Packs `passages` (already in descending-score order) into the remaining
///    budget, each labelled `[Passage n]`
/// 3. Truncates the first passage that does not fit and drops the rest
/// 4. Renders the final template with the packed context
///
/// Budgets count characters, not bytes.
///
/// # Errors
/// Returns `AppError::Prompt` when the template and question alone use up the
/// budget.
///
/// # Example
/// ```no_run
/// use docqa_prompt::{build_bounded_prompt, default_answer_prompt};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = default_answer_prompt()?;
/// let passages = vec!["Cats are mammals.".to_string()];
/// let built = build_bounded_prompt(&def, "Are cats mammals?", &passages, 4000)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_bounded_prompt(
    definition: &PromptDefinition,
    question: &str,
    passages: &[String],
    max_chars: usize,
) -> AppResult<BuiltPrompt> {
    let system_chars = definition
        .system
        .as_deref()
        .map_or(0, |system| system.chars().count());
    let overhead = system_chars + render_answer(definition, question, "")?.chars().count();
    if overhead >= max_chars {
        return Err(AppError::Prompt(format!(
            "Prompt system message, template and question need {} chars, budget is {}",
            overhead, max_chars
        )));
    }

    let (context, context_chunks, truncated_chunks) =
        pack_passages(passages, max_chars - overhead);

    let user = render_answer(definition, question, &context)?;
    let used = system_chars + user.chars().count();
    if used > max_chars {
        return Err(AppError::Prompt(format!(
            "Rendered prompt has {} chars, budget is {}",
            used, max_chars
        )));
    }

    tracing::debug!(
        prompt_id = %definition.id,
        context_chunks,
        truncated_chunks,
        chars = used,
        "Built answer prompt"
    );

    Ok(BuiltPrompt::new(
        definition.system.clone(),
        user,
        definition.id.clone(),
        context_chunks,
        truncated_chunks,
    ))
}

/// Fill `budget` characters with labelled passages.
///
/// Returns the context block, the number of passages included and how many of
/// those were truncated.
fn pack_passages(passages: &[String], budget: usize) -> (String, usize, usize) {
    let mut context = String::new();
    let mut remaining = budget;
    let mut included = 0;
    let mut truncated = 0;

    for (i, passage) in passages.iter().enumerate() {
        let separator = if context.is_empty() { "" } else { PASSAGE_SEPARATOR };
        let header = format!("[Passage {}]\n", i + 1);
        let framing = separator.chars().count() + header.chars().count();

        // Nothing useful fits after the label.
        if remaining <= framing {
            break;
        }

        let available = remaining - framing;
        let passage_len = passage.chars().count();

        context.push_str(separator);
        context.push_str(&header);
        included += 1;

        if passage_len <= available {
            context.push_str(passage);
            remaining -= framing + passage_len;
        } else {
            context.extend(passage.chars().take(available));
            truncated += 1;
            break;
        }
    }

    (context, included, truncated)
}

fn render_answer(definition: &PromptDefinition, question: &str, context: &str) -> AppResult<String> {
    let mut variables = HashMap::new();
    variables.insert("question".to_string(), question.to_string());
    variables.insert("context".to_string(), context.to_string());
    render_template(&definition.template, &variables)
}

/// Render a Handlebars template with variables.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            system: None,
            template: "Context:\n{{context}}\nQuestion: {{question}}".to_string(),
        }
    }

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Hello & <world>".to_string());

        let result = render_template("Q: {{question}}", &vars).unwrap();
        assert_eq!(result, "Q: Hello & <world>");
    }

    #[test]
    fn test_passages_included_verbatim_when_budget_allows() {
        let passages = vec![
            "Cats are mammals.".to_string(),
            "Dogs are mammals too.".to_string(),
        ];
        let built = build_bounded_prompt(&definition(), "Are dogs mammals?", &passages, 1000).unwrap();

        assert!(built
            .user
            .contains("[Passage 1]\nCats are mammals.\n\n[Passage 2]\nDogs are mammals too."));
        assert!(built.user.ends_with("Question: Are dogs mammals?"));
        assert_eq!(built.metadata.context_chunks, 2);
        assert_eq!(built.metadata.truncated_chunks, 0);
    }

    #[test]
    fn test_budget_truncates_lower_ranked_passages() {
        let passages = vec!["a".repeat(40), "b".repeat(40), "c".repeat(40)];
        let overhead = render_answer(&definition(), "q?", "").unwrap().chars().count();
        let budget = overhead + 70;

        let built = build_bounded_prompt(&definition(), "q?", &passages, budget).unwrap();

        assert!(built.metadata.char_count <= budget);
        assert!(built.user.contains(&"a".repeat(40)));
        assert!(!built.user.contains('c'));
        assert_eq!(built.metadata.truncated_chunks, 1);
    }

    #[test]
    fn test_budget_counts_characters_not_bytes() {
        let passages = vec!["ü".repeat(100)];
        let overhead = render_answer(&definition(), "q?", "").unwrap().chars().count();
        let built = build_bounded_prompt(&definition(), "q?", &passages, overhead + 30).unwrap();
        assert!(built.metadata.char_count <= overhead + 30);
    }

    #[test]
    fn test_question_larger_than_budget_fails() {
        let question = "x".repeat(500);
        let result = build_bounded_prompt(&definition(), &question, &[], 100);
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_system_message_counts_toward_budget() {
        let mut def = definition();
        def.system = Some("You answer questions about one document.".to_string());
        let passages = vec!["z".repeat(1000)];

        let built = build_bounded_prompt(&def, "q?", &passages, 400).unwrap();
        let system_len = built.system.as_deref().unwrap().chars().count();

        assert!(system_len + built.user.chars().count() <= 400);
        assert_eq!(built.metadata.char_count, system_len + built.user.chars().count());
        assert_eq!(built.metadata.truncated_chunks, 1);
    }

    #[test]
    fn test_system_message_alone_can_exhaust_budget() {
        let mut def = definition();
        def.system = Some("s".repeat(300));
        let result = build_bounded_prompt(&def, "q?", &[], 300);
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_no_passages_renders_empty_context() {
        let built = build_bounded_prompt(&definition(), "q?", &[], 200).unwrap();
        assert_eq!(built.metadata.context_chunks, 0);
        assert_eq!(built.user, "Context:\n\nQuestion: q?");
    }
}
