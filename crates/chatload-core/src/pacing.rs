//! Cyclic prompt cursor.

/// Walks a prompt sequence in order, wrapping around when exhausted.
///
/// The engine knows nothing about time; the orchestrator decides when to
/// call [`PacingEngine::next`].
#[derive(Debug, Clone)]
pub struct PacingEngine {
    prompts: Vec<String>,
    cursor: usize,
}

impl PacingEngine {
    /// Create an engine over a prompt sequence.
    ///
    /// An empty sequence yields empty prompts.
    #[must_use]
    pub const fn new(prompts: Vec<String>) -> Self {
        Self { prompts, cursor: 0 }
    }

    /// Return the prompt at the cursor and advance it.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> &str {
        if self.prompts.is_empty() {
            return "";
        }
        let index = self.cursor % self.prompts.len();
        self.cursor = self.cursor.wrapping_add(1);
        &self.prompts[index]
    }

    /// Prompt that the next call to `next` will return.
    #[must_use]
    pub fn peek(&self) -> Option<&str> {
        if self.prompts.is_empty() {
            None
        } else {
            Some(&self.prompts[self.cursor % self.prompts.len()])
        }
    }

    /// Number of prompts handed out so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
