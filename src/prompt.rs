//! Few-shot prompt assembly.
//!
//! The prompt has three parts: a fixed instruction, an example section and
//! a task footer carrying the query. Only the example section is ever
//! shortened to fit a character budget.

use thiserror::Error;

use crate::types::SupportExample;

/// Default instruction placed at the top of every prompt.
pub const DEFAULT_INSTRUCTION: &str = "You are an expert linguist. Follow MaxMatch standard.\n\
Given Input, produce a clear reasoning (Chain-of-Thought) explaining the error,\n\
then produce a correction. Output MUST be a single valid JSON object and nothing else with fields: `input`, `reasoning`, `correction`, `error_type`.";

const EXAMPLES_HEADER: &str = "Reference Examples:\n";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// The instruction and task footer alone are longer than the budget.
    #[error("prompt needs at least {required} characters but the budget is {budget}")]
    BudgetTooSmall { required: usize, budget: usize },
}

/// An assembled prompt and how many examples made it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub examples_used: usize,
    /// The example section had to be cut mid-way.
    pub truncated: bool,
}

/// Picks a diverse subset of ranked examples and renders them under a budget.
#[derive(Debug, Clone)]
pub struct ExampleAssembler {
    instruction: String,
    max_chars: Option<usize>,
}

impl Default for ExampleAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTION)
    }
}

impl ExampleAssembler {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            max_chars: None,
        }
    }

    /// Cap the whole prompt at `max_chars` characters.
    pub fn with_budget(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn budget(&self) -> Option<usize> {
        self.max_chars
    }

    /// Evenly strided picks from `items`: positions `0, s, 2s, ...` with
    /// `s = max(1, len / k)`, at most `k` of them. All items when `len <= k`.
    pub fn select_diverse<T>(items: &[T], k: usize) -> Vec<&T> {
        if items.len() <= k {
            return items.iter().collect();
        }
        let stride = (items.len() / k.max(1)).max(1);
        items.iter().step_by(stride).take(k).collect()
    }

    /// Render the prompt for `query` using up to `k` of `examples`.
    pub fn assemble(
        &self,
        query: &str,
        examples: &[SupportExample],
        k: usize,
    ) -> Result<Prompt, PromptError> {
        let head = format!("{}\n\n", self.instruction);
        let footer = render_footer(query);
        let fixed = char_len(&head) + char_len(&footer);

        let Some(budget) = self.max_chars else {
            let picked = Self::select_diverse(examples, k);
            let section = render_section(&picked);
            return Ok(Prompt {
                text: format!("{head}{section}{footer}"),
                examples_used: picked.len(),
                truncated: false,
            });
        };

        if fixed > budget {
            return Err(PromptError::BudgetTooSmall {
                required: fixed,
                budget,
            });
        }
        let allowance = budget - fixed;

        for n in (0..=k.min(examples.len())).rev() {
            let picked = Self::select_diverse(examples, n);
            let section = render_section(&picked);
            if char_len(&section) <= allowance {
                return Ok(Prompt {
                    text: format!("{head}{section}{footer}"),
                    examples_used: picked.len(),
                    truncated: false,
                });
            }
        }

        // Not even the bare header fits: cut the section, never the rest.
        let section: String = render_section(&[]).chars().take(allowance).collect();
        Ok(Prompt {
            text: format!("{head}{section}{footer}"),
            examples_used: 0,
            truncated: true,
        })
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn render_example(example: &SupportExample) -> String {
    format!(
        "Example Input: {}\nReasoning: {}\nCorrection: {}\nError Type: {}\n",
        example.input,
        example.reasoning,
        example.correction,
        example.error_type.as_deref().unwrap_or("None"),
    )
}

fn render_section(examples: &[&SupportExample]) -> String {
    let mut section = String::from(EXAMPLES_HEADER);
    for example in examples {
        section.push_str(&render_example(example));
        section.push('\n');
    }
    section
}

fn render_footer(query: &str) -> String {
    format!(
        "\nTask:\nInput: {query}\n\n\
Please provide:\n\
1) A `reasoning` section that explains the grammatical issue.\n\
2) A `correction` section with the corrected sentence.\n\
3) An `error_type` label (VT/PREP/DET/SVA/etc.).\n\n\
Return only the JSON object."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn examples(n: usize) -> Vec<SupportExample> {
        (0..n)
            .map(|i| SupportExample {
                input: format!("input {i}"),
                reasoning: format!("reasoning {i}"),
                correction: format!("correction {i}"),
                error_type: (i % 2 == 0).then(|| "VT".to_string()),
            })
            .collect()
    }

    #[test]
    fn select_takes_all_when_few() {
        let items = [1, 2, 3];
        assert_eq!(ExampleAssembler::select_diverse(&items, 5), vec![&1, &2, &3]);
    }

    #[test]
    fn select_strides_across_ranking() {
        let items: Vec<usize> = (0..10).collect();
        let picked: Vec<usize> = ExampleAssembler::select_diverse(&items, 3)
            .into_iter()
            .copied()
            .collect();
        // stride = 10 / 3 = 3
        assert_eq!(picked, vec![0, 3, 6]);

        let picked: Vec<usize> = ExampleAssembler::select_diverse(&items, 4)
            .into_iter()
            .copied()
            .collect();
        assert_eq!(picked, vec![0, 2, 4, 6]);
    }

    #[test]
    fn select_zero_is_empty() {
        let items = [1, 2, 3];
        assert!(ExampleAssembler::select_diverse(&items, 0).is_empty());
    }

    #[test]
    fn unbounded_prompt_contains_everything() {
        let assembler = ExampleAssembler::default();
        let prompt = assembler
            .assemble("She go to school yesterday.", &examples(3), 5)
            .unwrap();
        assert_eq!(prompt.examples_used, 3);
        assert!(prompt.text.starts_with("You are an expert linguist."));
        assert!(prompt.text.contains("Reference Examples:\n"));
        assert!(prompt.text.contains("Example Input: input 2"));
        assert!(prompt.text.contains("Error Type: None"));
        assert!(prompt.text.contains("Input: She go to school yesterday.\n"));
        assert!(prompt.text.ends_with("Return only the JSON object."));
    }

    #[test]
    fn budget_shrinks_example_count() {
        let full = ExampleAssembler::default()
            .assemble("q", &examples(5), 5)
            .unwrap();
        let budget = char_len(&full.text) - 10;

        let prompt = ExampleAssembler::default()
            .with_budget(Some(budget))
            .assemble("q", &examples(5), 5)
            .unwrap();
        assert!(prompt.examples_used < 5);
        assert!(char_len(&prompt.text) <= budget);
        assert!(!prompt.truncated);
    }

    #[test]
    fn budget_never_exceeded_and_query_kept() {
        let query = "Ünïcödé qüery with wïde chars.";
        let zero = ExampleAssembler::default()
            .assemble(query, &[], 0)
            .unwrap();
        let minimum = char_len(&zero.text);

        for budget in [minimum, minimum + 40, minimum + 200, minimum + 5000] {
            let prompt = ExampleAssembler::default()
                .with_budget(Some(budget))
                .assemble(query, &examples(8), 4)
                .unwrap();
            assert!(char_len(&prompt.text) <= budget, "budget {budget}");
            assert!(prompt.text.contains(query));
        }
    }

    #[test]
    fn header_is_cut_when_nothing_else_fits() {
        let zero = ExampleAssembler::default().assemble("q", &[], 0).unwrap();
        let budget = char_len(&zero.text) - 5;

        let prompt = ExampleAssembler::default()
            .with_budget(Some(budget))
            .assemble("q", &examples(2), 2)
            .unwrap();
        assert!(prompt.truncated);
        assert_eq!(prompt.examples_used, 0);
        assert_eq!(char_len(&prompt.text), budget);
        assert!(prompt.text.contains("Input: q\n"));
        assert!(prompt.text.starts_with(DEFAULT_INSTRUCTION));
    }

    #[test]
    fn budget_below_fixed_parts_is_an_error() {
        let err = ExampleAssembler::default()
            .with_budget(Some(20))
            .assemble("q", &examples(2), 2)
            .unwrap_err();
        assert!(matches!(err, PromptError::BudgetTooSmall { budget: 20, .. }));
    }

    #[test]
    fn custom_instruction_used_verbatim() {
        let prompt = ExampleAssembler::new("Fix it.")
            .assemble("q", &[], 3)
            .unwrap();
        assert!(prompt.text.starts_with("Fix it.\n\nReference Examples:\n"));
    }
}
