//! Built-in prompt corpus.

use crate::config::PromptCategory;

const GENERAL: &[&str] = &[
    "Hello! How are you today?",
    "What's something interesting you learned recently?",
    "Can you recommend a good book to read?",
    "What do you think makes a conversation enjoyable?",
    "Tell me a fun fact about the ocean.",
    "What's a good way to start the morning?",
    "How would you describe yourself in three words?",
    "What's your favorite season and why?",
];

const QA: &[&str] = &[
    "What is the capital of Australia?",
    "How many planets are in the solar system?",
    "Who wrote 'Pride and Prejudice'?",
    "What is the boiling point of water at sea level in Celsius?",
    "Which element has the chemical symbol 'Fe'?",
    "What year did the first human land on the Moon?",
    "What is the largest mammal on Earth?",
    "How many continents are there?",
];

const CREATIVE: &[&str] = &[
    "Write a haiku about a rainy afternoon.",
    "Describe a city that floats above the clouds.",
    "Invent a new holiday and explain how people celebrate it.",
    "Tell a two-sentence story about a lost key.",
    "Describe the color blue to someone who has never seen it.",
    "Write the opening line of a mystery novel.",
    "Imagine a conversation between the sun and the moon.",
    "Create a recipe for a dish that could only exist in a dream.",
];

const TECHNICAL: &[&str] = &[
    "Explain the difference between a process and a thread.",
    "What is the purpose of a hash function?",
    "How does TCP guarantee ordered delivery?",
    "What is the difference between stack and heap memory?",
    "Explain what a race condition is with an example.",
    "How does a WebSocket connection differ from plain HTTP?",
    "What are the trade-offs of using a relational database?",
    "Describe how public-key cryptography works at a high level.",
];

const EDUCATIONAL: &[&str] = &[
    "Explain photosynthesis in simple terms.",
    "Why do we have seasons on Earth?",
    "What caused the fall of the Roman Empire?",
    "How do vaccines train the immune system?",
    "What is the Pythagorean theorem used for?",
    "Explain supply and demand with an everyday example.",
    "How do tides work?",
    "What is the difference between weather and climate?",
];

/// Built-in prompts for a category.
///
/// `Custom` has no built-in list of its own and resolves to the general set.
#[must_use]
pub const fn builtin(category: PromptCategory) -> &'static [&'static str] {
    match category {
        PromptCategory::General | PromptCategory::Custom => GENERAL,
        PromptCategory::Qa => QA,
        PromptCategory::Creative => CREATIVE,
        PromptCategory::Technical => TECHNICAL,
        PromptCategory::Educational => EDUCATIONAL,
    }
}

/// Built-in prompts as owned strings, ready for a `PacingEngine`.
#[must_use]
pub fn builtin_owned(category: PromptCategory) -> Vec<String> {
    builtin(category).iter().map(|p| (*p).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_prompts() {
        for category in PromptCategory::ALL {
            assert!(!builtin(*category).is_empty(), "{category} is empty");
        }
    }

    #[test]
    fn test_custom_uses_general_set() {
        assert_eq!(builtin(PromptCategory::Custom), GENERAL);
    }
}
