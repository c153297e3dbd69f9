//! Canned study prompts offered next to the thread.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedPrompt {
    pub title: &'static str,
    pub description: &'static str,
}

pub const SUGGESTED_PROMPTS: [SuggestedPrompt; 6] = [
    SuggestedPrompt {
        title: "Explain a complex topic",
        description: "Break down difficult concepts in academic format",
    },
    SuggestedPrompt {
        title: "Help with homework",
        description: "Get step-by-step academic guidance",
    },
    SuggestedPrompt {
        title: "Study techniques",
        description: "Learn effective academic study methods",
    },
    SuggestedPrompt {
        title: "Research assistance",
        description: "Help with academic research and citations",
    },
    SuggestedPrompt {
        title: "Math problem solver",
        description: "Step-by-step mathematical solutions with explanations",
    },
    SuggestedPrompt {
        title: "Learning strategies",
        description: "Personalized academic learning tips",
    },
];

const ACADEMIC_FORMAT: &str = "Please provide a detailed response in academic format, including:\n\n\
1. Introduction\n\
2. Main points with clear explanations\n\
3. Examples or applications\n\
4. Conclusion\n\
5. References (if applicable)";

impl SuggestedPrompt {
    /// Message text sent when the prompt is picked.
    pub fn compose(&self) -> String {
        format!("{}:\n\n{ACADEMIC_FORMAT}", self.title)
    }
}

/// Looks a prompt up by its 1-based position in the list.
pub fn suggested_prompt(position: usize) -> Option<&'static SuggestedPrompt> {
    position
        .checked_sub(1)
        .and_then(|index| SUGGESTED_PROMPTS.get(index))
}
