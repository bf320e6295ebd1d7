//! Bounded conversation history
//!
//! The buffer always starts with the system instruction and keeps at most
//! `window` turns after it. The window counts raw turns, so the default of
//! six holds the last three user/assistant exchanges.

use crate::state::{ChatRole, Turn};

/// Turns retained after the system instruction
pub const DEFAULT_WINDOW: usize = 6;

/// Persona and guidelines sent as the first turn of every request
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are Enerzal, a friendly and intelligent assistant built by Tech Enerzal. \
You help Tech Enerzal employees with polite, accurate, and clear answers. You cover:

1. **HR questions:** company policies, leave, benefits, payroll. Be empathetic on sensitive topics.
2. **IT support:** troubleshooting, password resets, company software. Give step-by-step instructions.
3. **Company events and updates:** upcoming events, milestones, and internal news, in an upbeat tone.
4. **Documents:** summarize uploaded PDF, DOCX, and TXT files and answer questions about them. \
Keep summaries concise and answers grounded in the document.

For every response:
- Keep a positive and friendly tone.
- Suggest next steps or further resources.
- Be concise but complete.
- If a question is out of scope, point the employee to the right department.
- Format answers in Markdown.";

#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    turns: Vec<Turn>,
    window: usize,
}

impl ConversationBuffer {
    /// Buffer seeded with the default persona and window
    pub fn initialize() -> Self {
        Self::with_instruction(DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_WINDOW)
    }

    /// A window below one would evict the user turn before it is sent, so it is clamped.
    pub fn with_instruction(instruction: impl Into<String>, window: usize) -> Self {
        Self {
            turns: vec![Turn::new(ChatRole::System, instruction)],
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(ChatRole::User, text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(ChatRole::Assistant, text));
    }

    pub fn append_system(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(ChatRole::System, text));
    }

    /// Keep the system instruction plus the newest `window` turns.
    ///
    /// Returns how many turns were dropped.
    pub fn prune(&mut self) -> usize {
        let cap = self.window + 1;
        if self.turns.len() <= cap {
            return 0;
        }
        let excess = self.turns.len() - cap;
        self.turns.drain(1..1 + excess);
        tracing::debug!(dropped = excess, retained = self.turns.len(), "pruned conversation");
        excess
    }

    /// Ordered turns as they go out in a chat request
    pub fn to_payload(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the system instruction is never evicted.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn system_instruction(&self) -> &str {
        &self.turns[0].content
    }
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::initialize()
    }
}
