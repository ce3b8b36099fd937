// File: classifier.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::RunConfig;
use std::collections::BTreeSet;

/// Decides whether a response is a block page.
#[derive(Debug, Clone)]
pub struct BlockClassifier {
    block_status: BTreeSet<u16>,
    block_phrases: Vec<String>,
    peek_bytes: usize,
}

impl BlockClassifier {
    pub fn new(block_status: BTreeSet<u16>, block_phrases: Vec<String>, peek_bytes: usize) -> Self {
        Self {
            block_status,
            block_phrases,
            peek_bytes: peek_bytes.max(1),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.block_status().clone(),
            config.block_phrases().to_vec(),
            config.peek_bytes(),
        )
    }

    pub fn is_block_status(&self, status: u16) -> bool {
        self.block_status.contains(&status)
    }

    pub fn contains_phrase(&self, text: &str) -> bool {
        self.block_phrases.iter().any(|p| text.contains(p.as_str()))
    }

    /// Status or phrase anywhere in `body`, as used by the pre-flight check.
    pub fn is_blocked(&self, status: u16, body: &str) -> bool {
        self.is_block_status(status) || self.contains_phrase(body)
    }

    pub fn peek_bytes(&self) -> usize {
        self.peek_bytes
    }

    pub fn body_peek(&self) -> BodyPeek {
        BodyPeek::new(self.peek_bytes)
    }
}

/// Accumulates at most `limit` bytes of a response body.
#[derive(Debug)]
pub struct BodyPeek {
    buf: Vec<u8>,
    limit: usize,
}

impl BodyPeek {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(64 * 1024)),
            limit,
        }
    }

    /// Appends a chunk. Returns `true` once the limit is reached.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let room = self.limit.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Decodes what was collected, replacing invalid sequences, and never
    /// returns more than `limit` bytes of text.
    pub fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.buf).into_owned();
        if text.len() > self.limit {
            let mut cut = self.limit;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        text
    }

    /// Text snippet plus whether it contains a block phrase.
    pub fn classify(self, classifier: &BlockClassifier) -> (bool, String) {
        let text = self.into_text();
        (classifier.contains_phrase(&text), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classifier() -> BlockClassifier {
        BlockClassifier::from_config(&RunConfig::new())
    }

    #[rstest]
    #[case(403, true)]
    #[case(406, true)]
    #[case(429, true)]
    #[case(200, false)]
    #[case(404, false)]
    #[case(0, false)]
    fn default_block_statuses(#[case] status: u16, #[case] blocked: bool) {
        assert_eq!(classifier().is_block_status(status), blocked);
    }

    #[test]
    fn phrase_match_is_substring() {
        let c = classifier();
        assert!(c.contains_phrase("<h1>Access denied</h1> by policy"));
        assert!(!c.contains_phrase("access granted"));
        assert!(c.is_blocked(200, "Request blocked by edge"));
        assert!(c.is_blocked(403, ""));
    }

    #[test]
    fn peek_never_exceeds_limit() {
        let mut peek = BodyPeek::new(8);
        assert!(!peek.push(b"abc"));
        assert!(peek.push(b"defghijkl"));
        assert_eq!(peek.len(), 8);
        assert_eq!(peek.into_text(), "abcdefgh");
    }

    #[test]
    fn lossy_decode_stays_within_limit() {
        let mut peek = BodyPeek::new(4);
        peek.push(&[0xff, 0xfe, b'o', b'k']);
        let text = peek.into_text();
        assert!(text.len() <= 4, "got {} bytes", text.len());
        assert!(text.starts_with('\u{FFFD}'));
    }

    #[test]
    fn partial_body_still_classifies() {
        let c = BlockClassifier::new(BTreeSet::new(), vec!["blocked".to_string()], 1024);
        let mut peek = c.body_peek();
        peek.push(b"<html>Request was blo");
        peek.push(b"cked</html>");
        let (blocked, text) = peek.classify(&c);
        assert!(blocked);
        assert_eq!(text, "<html>Request was blocked</html>");
    }

    #[test]
    fn phrase_past_peek_window_is_missed() {
        let c = BlockClassifier::new(BTreeSet::new(), vec!["Access denied".to_string()], 16);
        let mut peek = c.body_peek();
        peek.push(b"0123456789abcdef Access denied");
        let (blocked, text) = peek.classify(&c);
        assert!(!blocked);
        assert_eq!(text.len(), 16);
    }
}
