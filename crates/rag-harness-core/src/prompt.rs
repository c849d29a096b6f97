//! Augmented prompt assembly.
//!
//! The retrieved context always comes before the question, and the prompt
//! always tells the model to say so when the context does not contain the
//! answer. That instruction constrains hallucination but is only prompt
//! text; nothing here enforces it.

use crate::models::ScoredPassage;

/// Default grounding instruction.
pub const DEFAULT_INSTRUCTION: &str = "Answer the question using only the context below. \
If the context does not contain the answer, say that you could not find the answer \
in the provided documents.";

/// A composed prompt, ready for the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedPrompt {
    pub text: String,
    /// Number of passages embedded in the context block.
    pub context_passages: usize,
}

/// Instruction text wrapped around the context and the question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    instruction: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }
}

impl PromptTemplate {
    /// A template with a custom instruction. Blank instructions fall back to
    /// [`DEFAULT_INSTRUCTION`] so the no-answer clause is never lost.
    pub fn new(instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Self::default();
        }
        Self { instruction }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Compose the prompt: instruction, numbered context, then the question.
    pub fn build(&self, passages: &[ScoredPassage], question: &str) -> AugmentedPrompt {
        let context = passages
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("[{}] {}", i + 1, hit.passage.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let text = format!(
            "{}\n\nContext:\n{}\n\nQuestion:\n{}\n\nAnswer:",
            self.instruction,
            context,
            question.trim()
        );

        AugmentedPrompt {
            text,
            context_passages: passages.len(),
        }
    }
}

/// Build a prompt with the default template.
pub fn build_prompt(passages: &[ScoredPassage], question: &str) -> AugmentedPrompt {
    PromptTemplate::default().build(passages, question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Passage;

    fn hit(i: usize, text: &str) -> ScoredPassage {
        ScoredPassage {
            passage: Passage::new("doc", i, text),
            score: 0.0,
            position: i,
        }
    }

    #[test]
    fn test_context_precedes_question() {
        let prompt = build_prompt(
            &[hit(0, "Saigon is the economic center."), hit(1, "Pho is a noodle soup.")],
            "Which city is the economic center?",
        );
        let ctx = prompt.text.find("Saigon is the economic center.").unwrap();
        let second = prompt.text.find("Pho is a noodle soup.").unwrap();
        let q = prompt.text.find("Which city is the economic center?").unwrap();
        assert!(ctx < second && second < q);
        assert_eq!(prompt.context_passages, 2);
    }

    #[test]
    fn test_contains_no_answer_instruction() {
        let prompt = build_prompt(&[], "anything?");
        assert!(prompt.text.contains("could not find the answer"));
        assert_eq!(prompt.context_passages, 0);
    }

    #[test]
    fn test_custom_instruction() {
        let template = PromptTemplate::new("Trả lời dựa vào ngữ cảnh. Nếu không có, hãy nói rõ.");
        let prompt = template.build(&[hit(0, "Phở là món ăn truyền thống.")], "Phở là gì?");
        assert!(prompt.text.starts_with("Trả lời dựa vào ngữ cảnh."));
    }

    #[test]
    fn test_blank_instruction_falls_back() {
        assert_eq!(PromptTemplate::new("   "), PromptTemplate::default());
    }
}
