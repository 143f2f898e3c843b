//! Code extraction from markdown-fenced model replies.

use std::fmt;

const FENCE: &str = "```";

/// Source language the sandbox runs; its tagged fence wins over plain fences.
pub const SOURCE_LANGUAGE: &str = "python";

/// Text payload of a fenced block. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBlock(String);

impl CodeBlock {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn has_fence(reply: &str) -> bool {
    reply.contains(FENCE)
}

/// First block fenced as ```` ```<language> ````, else the first plain fenced
/// block, else empty. Only the first block counts; an unclosed fence runs to
/// the end of the reply.
pub fn extract_code_block(reply: &str, language: &str) -> CodeBlock {
    let tagged = format!("{FENCE}{language}");
    let body = if !language.is_empty() && reply.contains(&tagged) {
        reply.split_once(&tagged).map(|(_, rest)| rest)
    } else {
        reply.split_once(FENCE).map(|(_, rest)| rest)
    };
    match body {
        Some(rest) => {
            let inner = rest.split_once(FENCE).map_or(rest, |(code, _)| code);
            CodeBlock::new(inner.trim())
        }
        None => CodeBlock::default(),
    }
}
