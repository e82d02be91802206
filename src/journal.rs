use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::models::{ConversationResult, JournalEntry, Message, Role, Stats};
use crate::prompts::FALLBACK_TRIGGER;

/// Journal entries, newest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new(entries: Vec<JournalEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&JournalEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.insert(0, entry);
    }

    /// Flip `completed` on the matching entry. Returns false when absent.
    pub fn toggle_completed(&mut self, id: i64) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.completed = !entry.completed;
                true
            }
            None => false,
        }
    }

    /// Returns false when absent
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Id for a new entry created at `now_ms`, strictly above every existing id
    pub fn next_id(&self, now_ms: i64) -> i64 {
        match self.entries.iter().map(|e| e.id).max() {
            Some(last) => now_ms.max(last + 1),
            None => now_ms,
        }
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats {
            total: self.entries.len(),
            ..Stats::default()
        };
        for entry in &self.entries {
            if entry.completed {
                stats.completed += 1;
            }
            if let Some(emotion) = entry.emotion {
                *stats.types.entry(emotion).or_insert(0) += 1;
            }
        }
        stats
    }
}

/// Build the entry for a finished conversation
pub fn new_entry(
    id: i64,
    conversation: Vec<Message>,
    result: ConversationResult,
    now: DateTime<Utc>,
) -> JournalEntry {
    let trigger = conversation
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_else(|| FALLBACK_TRIGGER.to_string());

    JournalEntry {
        id,
        trigger,
        emotion: Some(result.emotion),
        suggestion: result.suggestion,
        date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        completed: false,
        conversation,
    }
}

// ============ Progress ============

const LEVELS: [(usize, &str); 4] = [
    (5, "觉察萌新"),
    (15, "觉察练习生"),
    (30, "情绪冲浪者"),
    (100, "内观大师"),
];

/// Awareness level earned from the number of journal entries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub level: u8,
    pub title: &'static str,
    pub next_level_xp: usize,
    pub percent: f64, // toward next_level_xp, capped at 100
}

pub fn progress(total: usize) -> Progress {
    let index = LEVELS
        .iter()
        .take(LEVELS.len() - 1)
        .position(|(threshold, _)| total < *threshold)
        .unwrap_or(LEVELS.len() - 1);
    let (next_level_xp, title) = LEVELS[index];

    Progress {
        level: index as u8 + 1,
        title,
        next_level_xp,
        percent: (total as f64 / next_level_xp as f64 * 100.0).min(100.0),
    }
}
