//! Model output cleanup
//!
//! Models asked for bare code still wrap it in a Markdown fence now and then.
//! [`FenceSanitizer`] peels those fences off. It runs on every growing prefix
//! of a stream, so it must also cope with an opening fence whose closing half
//! has not arrived yet.

use once_cell::sync::Lazy;
use regex::Regex;

/// Turns raw model output into a clean artifact
pub trait Sanitizer: Send + Sync {
    /// Clean `raw`. Implementations must be idempotent.
    fn clean(&self, raw: &str) -> String;
}

/// Opening fence line: three backticks, optional info string, newline
static OPENING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\A```[^`\n]*\n").expect("opening fence pattern is valid")
});

/// An opening fence line still waiting for its newline
static PENDING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\A```[^`\n]*\z").expect("pending fence pattern is valid")
});

/// Closing fence at the very end
static CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\r?\n)?[ \t]*```\z").expect("closing fence pattern is valid")
});

/// Strips Markdown code fences wrapped around the whole output
#[derive(Debug, Clone, Copy, Default)]
pub struct FenceSanitizer;

impl FenceSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for FenceSanitizer {
    fn clean(&self, raw: &str) -> String {
        let mut text = raw.trim();

        loop {
            if PENDING_FENCE.is_match(text) {
                return String::new();
            }

            let Some(opening) = OPENING_FENCE.find(text) else {
                break;
            };
            text = &text[opening.end()..];

            if let Some(closing) = CLOSING_FENCE.find(text) {
                text = &text[..closing.start()];
            }
            text = text.trim();
        }

        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clean(raw: &str) -> String {
        FenceSanitizer.clean(raw)
    }

    #[test]
    fn test_fenced_tsx_block() {
        let raw = "```tsx\nexport default function App(){...}\n```";
        assert_eq!(clean(raw), "export default function App(){...}");
    }

    #[test]
    fn test_bare_fence_and_surrounding_whitespace() {
        assert_eq!(clean("\n\n```\nconst x = 1;\n```\n  "), "const x = 1;");
        assert_eq!(clean("```typescript\r\nconst x = 1;\r\n```"), "const x = 1;");
    }

    #[test]
    fn test_unfenced_input_is_trimmed_identity() {
        let code = "import { useState } from 'react';\n\nexport default function App() {}";
        assert_eq!(clean(code), code);
        assert_eq!(clean(&format!("  {}\n", code)), code);
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```tsx\nexport default function App(){}\n```",
            "```\n```tsx\nconst a = 1;\n```\n```",
            "```js",
            "plain text",
            "``` not a fence ```",
            "```tsx\n",
            "```tsx\nconst a = `template`;\n",
        ];
        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_nested_fences_are_peeled() {
        let raw = "```\n```tsx\nconst a = 1;\n```\n```";
        assert_eq!(clean(raw), "const a = 1;");
    }

    #[test]
    fn test_unclosed_fence_on_stream_prefix() {
        assert_eq!(clean("``"), "``");
        assert_eq!(clean("```ts"), "");
        assert_eq!(clean("```tsx\nexport default"), "export default");
        assert_eq!(clean("```tsx\nexport default function App() {}\n``"), "export default function App() {}\n``");
    }

    #[test]
    fn test_inner_backticks_survive() {
        let raw = "```tsx\nconst msg = `hi ${name}`;\n```";
        assert_eq!(clean(raw), "const msg = `hi ${name}`;");
    }

    /// Text built mostly from fence pieces, backticks and line breaks
    fn fence_heavy() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                Just("```"),
                Just("```tsx\n"),
                Just("\n```"),
                Just("`"),
                Just("\n"),
                Just(" "),
                Just("\t"),
                Just("const a = 1;"),
            ],
            0..16,
        )
        .prop_map(|parts| parts.concat())
    }

    /// Body text that never contains a fence of its own
    fn fence_free_body() -> impl Strategy<Value = String> {
        r"[a-z0-9 \n\t{}();=<>/`éø😀]{0,80}"
            .prop_filter("body must not contain a fence", |body| !body.contains("```"))
    }

    proptest! {
        #[test]
        fn prop_idempotent_on_any_text(raw in any::<String>()) {
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn prop_idempotent_on_fence_heavy_text(raw in fence_heavy()) {
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn prop_unfenced_text_is_only_trimmed(raw in prop_oneof![any::<String>(), fence_heavy()]) {
            prop_assume!(!raw.trim_start().starts_with("```"));
            prop_assert_eq!(clean(&raw), raw.trim());
        }

        #[test]
        fn prop_fenced_body_is_recovered(tag in "[a-z]{0,8}", body in fence_free_body()) {
            let raw = format!("```{}\n{}\n```", tag, body);
            prop_assert_eq!(clean(&raw), body.trim());
        }
    }
}
