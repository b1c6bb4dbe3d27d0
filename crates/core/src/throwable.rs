//! Structured error chains stored with log records
//!
//! A [`ThrowableInfo`] is the persisted shape of an error: message, ordered
//! stack frames, an optional cause and any suppressed errors, each of the
//! same shape. Nesting is bounded by [`MAX_THROWABLE_DEPTH`]; levels beyond
//! the cap are dropped both at capture time and before encoding.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;

use crate::limits::MAX_THROWABLE_DEPTH;

/// Persisted representation of an error and its causes
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrowableInfo {
    /// Error message
    pub message: String,
    /// Stack frames, innermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    /// Underlying cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ThrowableInfo>>,
    /// Errors suppressed while handling this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<ThrowableInfo>,
}

impl ThrowableInfo {
    /// Create a throwable with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Builder: set stack frames
    pub fn with_stack(mut self, frames: Vec<String>) -> Self {
        self.stack = frames;
        self
    }

    /// Builder: set the cause
    pub fn with_cause(mut self, cause: ThrowableInfo) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Builder: add a suppressed throwable
    pub fn with_suppressed(mut self, suppressed: ThrowableInfo) -> Self {
        self.suppressed.push(suppressed);
        self
    }

    /// Capture an error and its `source()` chain.
    ///
    /// The chain is walked iteratively; at most [`MAX_THROWABLE_DEPTH`] links
    /// are kept.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut messages = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = current {
            if messages.len() == MAX_THROWABLE_DEPTH {
                break;
            }
            messages.push(e.to_string());
            current = e.source();
        }

        // Build from the innermost cause outwards
        let mut chain: Option<ThrowableInfo> = None;
        for message in messages.into_iter().rev() {
            let mut info = ThrowableInfo::new(message);
            info.cause = chain.map(Box::new);
            chain = Some(info);
        }
        chain.unwrap_or_default()
    }

    /// Nesting depth, counting this throwable as 1
    pub fn depth(&self) -> usize {
        let cause_depth = self.cause.as_ref().map(|c| c.depth()).unwrap_or(0);
        let suppressed_depth = self.suppressed.iter().map(|s| s.depth()).max().unwrap_or(0);
        1 + cause_depth.max(suppressed_depth)
    }

    /// Copy with nesting cut to `max_depth` levels
    pub fn capped(&self, max_depth: usize) -> Option<ThrowableInfo> {
        if max_depth == 0 {
            return None;
        }
        Some(ThrowableInfo {
            message: self.message.clone(),
            stack: self.stack.clone(),
            cause: self
                .cause
                .as_ref()
                .and_then(|c| c.capped(max_depth - 1))
                .map(Box::new),
            suppressed: self
                .suppressed
                .iter()
                .filter_map(|s| s.capped(max_depth - 1))
                .collect(),
        })
    }

    /// Messages of this throwable and each cause, outermost first
    pub fn cause_messages(&self) -> Vec<&str> {
        let mut out = vec![self.message.as_str()];
        let mut current = self.cause.as_deref();
        while let Some(c) = current {
            out.push(c.message.as_str());
            current = c.cause.as_deref();
        }
        out
    }
}
