//! Keyword-based emotion detection over a finished transcript.

use crate::models::{Emotion, Message};

/// Transcript length at which the endpoint closes the conversation
pub const END_THRESHOLD: usize = 6;

/// Scanned in this order; the first category with any hit wins.
const EMOTION_KEYWORDS: [(Emotion, &[&str]); 4] = [
    (
        Emotion::Anxiety,
        &["担心", "怕", "焦虑", "做不完", "来不及", "很难", "失败", "压力", "烦", "慌", "紧张"],
    ),
    (
        Emotion::Envy,
        &["羡慕", "嫉妒", "他有", "凭什么", "差距", "别人", "好强", "优秀", "落后"],
    ),
    (
        Emotion::Fatigue,
        &["累", "不想动", "没意思", "无聊", "消耗", "困", "睡觉", "躺", "内耗", "不想", "疲惫"],
    ),
    (
        Emotion::Confusion,
        &["迷茫", "不知道", "方向", "意义", "为什么", "乱", "空", "茫然"],
    ),
];

pub fn should_end(message_count: usize) -> bool {
    message_count >= END_THRESHOLD
}

/// Keywords for an emotion; empty for `Neutral`
pub fn keywords(emotion: Emotion) -> &'static [&'static str] {
    EMOTION_KEYWORDS
        .iter()
        .find(|(e, _)| *e == emotion)
        .map(|(_, words)| *words)
        .unwrap_or(&[])
}

/// All prior message contents plus the new reply, space separated
pub fn conversation_text(messages: &[Message], reply: &str) -> String {
    let prior = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", prior, reply)
}

pub fn classify(text: &str) -> Emotion {
    EMOTION_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|kw| text.contains(kw)))
        .map(|(emotion, _)| *emotion)
        .unwrap_or(Emotion::Neutral)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        assert!(!should_end(0));
        assert!(!should_end(5));
        assert!(should_end(6));
        assert!(should_end(9));
    }

    #[test]
    fn test_single_category_match() {
        assert_eq!(classify("看到朋友圈大家都在晒旅行，突然觉得很羡慕"), Emotion::Envy);
        assert_eq!(classify("今天特别疲惫"), Emotion::Fatigue);
        assert_eq!(classify("感觉很迷茫"), Emotion::Confusion);
        assert_eq!(classify("有点担心下周的汇报"), Emotion::Anxiety);
    }

    #[test]
    fn test_earlier_category_wins() {
        // "累" is fatigue, "羡慕" is envy, "压力" is anxiety
        assert_eq!(classify("好累，又很羡慕别人"), Emotion::Envy);
        assert_eq!(classify("好累，压力也大"), Emotion::Anxiety);
        assert_eq!(classify("不知道为什么，好累"), Emotion::Fatigue);
    }

    #[test]
    fn test_no_keywords_is_neutral() {
        assert_eq!(classify("今天吃了一碗面，天气不错"), Emotion::Neutral);
        assert_eq!(classify(""), Emotion::Neutral);
    }

    #[test]
    fn test_match_is_literal_substring() {
        // "不想动" contains "不想", both fatigue; "空" matches inside "天空"
        assert_eq!(classify("周末不想动"), Emotion::Fatigue);
        assert_eq!(classify("看着天空发呆"), Emotion::Confusion);
    }

    #[test]
    fn test_conversation_text_includes_reply() {
        let messages = vec![Message::user("我最近压力好大，怕做不完"), Message::assistant("我听到了")];
        let text = conversation_text(&messages, "能再多说说吗？");
        assert_eq!(text, "我最近压力好大，怕做不完 我听到了 能再多说说吗？");
        assert_eq!(classify(&text), Emotion::Anxiety);
    }

    #[test]
    fn test_keywords_lookup() {
        assert!(keywords(Emotion::Anxiety).contains(&"压力"));
        assert_eq!(keywords(Emotion::Confusion).len(), 8);
        assert!(keywords(Emotion::Neutral).is_empty());
    }
}
