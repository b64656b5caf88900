//! Prompt composition
//!
//! The stored conversation keeps raw intents only. All framing (system
//! instructions, output directives) is added here each time a request is
//! built, so changing the instructions never rewrites history.

use instantcoder_inference::{ChatMessage, Role};

use crate::conversation::Turn;
use crate::session::Mode;

/// Bumped whenever [`SYSTEM_PROMPT`] changes meaning
pub const SYSTEM_PROMPT_VERSION: u32 = 1;

/// Instructions prepended to the first user turn of every conversation
pub const SYSTEM_PROMPT: &str = "\
You are an expert frontend React engineer who is also a great UI/UX designer. Follow the instructions carefully:

- Think carefully step by step.
- Create a React component for whatever the user asked you to create and make sure it can run by itself by using a default export.
- Make sure the React app is interactive and functional by creating state when needed and having no required props.
- If you use any imports from React like useState or useEffect, make sure to import them directly.
- Use TypeScript as the language for the React component.
- Use Tailwind classes for styling. DO NOT USE ARBITRARY VALUES (e.g. `h-[600px]`). Make sure to use a consistent color palette.
- Use Tailwind margin and padding classes to style the components and ensure the components are spaced out nicely.
- Please ONLY return the full React code starting with the imports, nothing else. DO NOT START WITH ```typescript or ```javascript or ```tsx or ```.
- ONLY IF the user asks for a dashboard, graph or chart, the recharts library is available to be imported, e.g. `import { LineChart, XAxis, ... } from \"recharts\"` & `<LineChart ...><XAxis dataKey=\"name\"> ...`. Please only use this when needed.
- For placeholder images, please use a <div className=\"bg-gray-200 border-2 border-dashed rounded-xl w-16 h-16\" />

NO OTHER LIBRARIES (e.g. zod, hookform) ARE INSTALLED OR ABLE TO BE IMPORTED.";

const INTENT_LABEL: &str = "\n\nUser Prompt: ";

const CODE_ONLY_DIRECTIVE: &str = "Please ONLY return code, NO backticks or language names. \
Don't start with ```typescript or ```javascript or ```tsx or ```.";

const MODIFICATION_LEAD: &str =
    "Based on the previous code provided by the assistant, please apply the following modification: ";

const MODIFIED_CODE_DIRECTIVE: &str =
    "Please ONLY return the *complete, modified* React code, NO backticks or language names.";

/// Builds the message list sent to the model
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    instructions: String,
}

impl MessageFormatter {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Compose the request for `intent` on top of `history`.
    ///
    /// A create ignores `history` and yields one user message. A modify
    /// renders every prior turn and appends the new instruction.
    pub fn compose(&self, history: &[Turn], intent: &str, mode: Mode) -> Vec<ChatMessage> {
        let prior: &[Turn] = match mode {
            Mode::Create => &[],
            Mode::Modify => history,
        };

        let mut messages = Vec::with_capacity(prior.len() + 1);
        let mut seen_user = false;
        for turn in prior {
            messages.push(match turn.role {
                Role::User => self.render_user(&turn.content, &mut seen_user),
                Role::Assistant => ChatMessage::from(turn),
            });
        }
        messages.push(self.render_user(intent, &mut seen_user));
        messages
    }

    fn render_user(&self, content: &str, seen_user: &mut bool) -> ChatMessage {
        let text = if *seen_user {
            format!("{}{}\n{}", MODIFICATION_LEAD, content, MODIFIED_CODE_DIRECTIVE)
        } else {
            format!(
                "{}{}{}\n{}",
                self.instructions, INTENT_LABEL, content, CODE_ONLY_DIRECTIVE
            )
        };
        *seen_user = true;
        ChatMessage::user(text)
    }
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new(SYSTEM_PROMPT)
    }
}
