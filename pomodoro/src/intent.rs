//! The "what am I working on" tag: one current intent plus pinned and
//! recently used lists.
//!
//! Both lists are deduplicated case-insensitively, capped, and hold only
//! sanitized non-empty entries. Every mutation re-normalizes them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAX_INTENT_LENGTH: usize = 80;
pub const MAX_PINNED: usize = 25;
pub const MAX_RECENTS: usize = 10;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskIntentState {
    current_intent: Option<String>,
    pinned: Vec<String>,
    /// Most recent first.
    recents: Vec<String>,
}

impl TaskIntentState {
    pub fn current(&self) -> Option<&str> {
        self.current_intent.as_deref()
    }

    pub fn pinned(&self) -> &[String] {
        &self.pinned
    }

    pub fn recents(&self) -> &[String] {
        &self.recents
    }

    /// Repair anything loaded from disk.
    pub fn normalize(&mut self) {
        self.current_intent = self.current_intent.as_deref().and_then(sanitize);
        self.pinned = normalize_list(&self.pinned, MAX_PINNED);
        self.recents = normalize_list(&self.recents, MAX_RECENTS);
        if let Some(current) = self.current_intent.clone() {
            push_mru(&mut self.recents, current, MAX_RECENTS);
        }
    }

    /// Replace the current intent. Returns whether it changed, ignoring case.
    pub fn set_current_intent(&mut self, raw: Option<&str>, add_to_recents: bool) -> bool {
        let next = raw.and_then(sanitize);
        let changed = !eq_opt_ignore_case(self.current_intent.as_deref(), next.as_deref());
        self.current_intent = next.clone();

        if add_to_recents {
            if let Some(value) = next {
                push_mru(&mut self.recents, value, MAX_RECENTS);
            }
        }

        self.pinned = normalize_list(&self.pinned, MAX_PINNED);
        self.recents = normalize_list(&self.recents, MAX_RECENTS);
        changed
    }

    pub fn pin(&mut self, raw: &str) -> bool {
        let Some(value) = sanitize(raw) else {
            return false;
        };
        if self.pinned.iter().any(|p| eq_ignore_case(p, &value)) {
            return false;
        }
        self.pinned.push(value);
        self.pinned = normalize_list(&self.pinned, MAX_PINNED);
        true
    }

    pub fn unpin(&mut self, raw: &str) -> bool {
        let Some(value) = sanitize(raw) else {
            return false;
        };
        let removed = remove_first(&mut self.pinned, &value);
        if removed {
            self.pinned = normalize_list(&self.pinned, MAX_PINNED);
        }
        removed
    }

    pub fn is_pinned(&self, raw: &str) -> bool {
        match sanitize(raw) {
            Some(value) => self.pinned.iter().any(|p| eq_ignore_case(p, &value)),
            None => false,
        }
    }
}

/// Trim, collapse whitespace and control characters into single spaces and
/// cap at [`MAX_INTENT_LENGTH`] characters. `None` if nothing is left.
pub fn sanitize(raw: &str) -> Option<String> {
    let mut collapsed = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch.is_control() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
            continue;
        }
        collapsed.push(ch);
        last_was_space = false;
    }

    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return None;
    }
    let capped: String = collapsed.chars().take(MAX_INTENT_LENGTH).collect();
    let capped = capped.trim_end();
    (!capped.is_empty()).then(|| capped.to_string())
}

/// Shorten `text` to `max_chars` characters for display, ending with a
/// single ellipsis when something was cut.
pub fn truncate_for_ui(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 1 {
        return text.chars().take(1).collect();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push(ELLIPSIS);
    out
}

fn normalize_list(items: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(items.len().min(max));
    for item in items {
        let Some(value) = sanitize(item) else {
            continue;
        };
        if !seen.insert(value.to_lowercase()) {
            continue;
        }
        result.push(value);
        if result.len() >= max {
            break;
        }
    }
    result
}

fn push_mru(list: &mut Vec<String>, item: String, max: usize) {
    remove_first(list, &item);
    list.insert(0, item);
    list.truncate(max);
}

fn remove_first(list: &mut Vec<String>, item: &str) -> bool {
    match list.iter().position(|existing| eq_ignore_case(existing, item)) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn eq_opt_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => eq_ignore_case(a, b),
        (None, None) => true,
        _ => false,
    }
}
