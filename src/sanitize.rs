#![forbid(unsafe_code)]

//! Turns display titles into file stems.

use parking_lot::Mutex;
use std::collections::HashSet;

/// Characters that are rejected by at least one common filesystem.
pub const FORBIDDEN_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Removes every forbidden character and keeps everything else verbatim,
/// including whitespace and non-ASCII text.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect()
}

/// Run-wide registry of file stems already handed out.
///
/// Every item names its temp and final files after its stem, so two items
/// whose titles sanitize identically would overwrite each other. The first
/// claimant keeps the plain stem; later ones get ` (2)`, ` (3)`, ...
#[derive(Debug, Default)]
pub struct TitleClaims {
    taken: Mutex<HashSet<String>>,
}

impl TitleClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, stem: &str) -> String {
        let mut taken = self.taken.lock();
        if taken.insert(stem.to_string()) {
            return stem.to_string();
        }
        let mut counter = 2usize;
        loop {
            let candidate = format!("{stem} ({counter})");
            if taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}
