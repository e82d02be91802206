use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============ Conversation ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============ Classification ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Anxiety,
    Envy,
    Fatigue,
    Confusion,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Emotion::Anxiety,
        Emotion::Envy,
        Emotion::Fatigue,
        Emotion::Confusion,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Anxiety => "anxiety",
            Emotion::Envy => "envy",
            Emotion::Fatigue => "fatigue",
            Emotion::Confusion => "confusion",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Cognitive,
    MicroAction,
}

/// A coping action shown once a conversation has been classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub desc: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationResult {
    pub emotion: Emotion,
    pub suggestion: Suggestion,
}

/// Out-of-band event closing a conversation: `{shouldEnd: true, result: {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalEvent {
    pub should_end: bool,
    pub result: ConversationResult,
}

impl TerminalEvent {
    pub fn new(result: ConversationResult) -> Self {
        Self {
            should_end: true,
            result,
        }
    }
}

// ============ Journal ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64, // creation time, ms since epoch
    pub trigger: String, // first user message
    // None for stored entries whose emotion is missing, null or unknown
    #[serde(default, deserialize_with = "lenient_emotion", skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    pub suggestion: Suggestion,
    pub date: String, // ISO-8601
    pub completed: bool,
    pub conversation: Vec<Message>,
}

fn lenient_emotion<'de, D>(deserializer: D) -> std::result::Result<Option<Emotion>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub daily_call: bool,
    pub privacy: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_call: true,
            privacy: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    DailyCall,
    Privacy,
}

impl Settings {
    pub fn with(mut self, key: SettingKey, value: bool) -> Self {
        match key {
            SettingKey::DailyCall => self.daily_call = value,
            SettingKey::Privacy => self.privacy = value,
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub types: BTreeMap<Emotion, usize>,
}
