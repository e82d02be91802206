//! Static coping-action catalog, one list per emotion.

use rand::Rng;

use crate::models::{Emotion, Suggestion, SuggestionKind};

#[derive(Debug, Clone, Copy)]
pub struct SuggestionTemplate {
    pub title: &'static str,
    pub kind: SuggestionKind,
    pub desc: &'static str,
    pub tag: &'static str,
}

impl SuggestionTemplate {
    pub fn to_suggestion(&self) -> Suggestion {
        Suggestion {
            title: self.title.to_string(),
            kind: self.kind,
            desc: self.desc.to_string(),
            tag: self.tag.to_string(),
        }
    }
}

const ANXIETY: &[SuggestionTemplate] = &[
    SuggestionTemplate {
        title: "极简原型实验",
        kind: SuggestionKind::MicroAction,
        desc: "不用做完整个方案。只在纸上画出核心草图，并在旁边写下1个你最想解决的问题。",
        tag: "对抗完美主义",
    },
    SuggestionTemplate {
        title: "最坏清单",
        kind: SuggestionKind::Cognitive,
        desc: "写下你担心的3个最坏结果，然后针对每一个问自己：\"如果发生了，我能怎么应对？\"",
        tag: "认知重构",
    },
    SuggestionTemplate {
        title: "2分钟原则",
        kind: SuggestionKind::MicroAction,
        desc: "如果这件事能在2分钟内做完，现在立刻就做，不要放进清单里。",
        tag: "即刻行动",
    },
];

const ENVY: &[SuggestionTemplate] = &[
    SuggestionTemplate {
        title: "转化嫉妒",
        kind: SuggestionKind::Cognitive,
        desc: "把你羡慕的那个人，想象成你的\"未来替身\"。告诉自己：\"他提前帮我验证了这条路是可行的。\"",
        tag: "思维转换",
    },
    SuggestionTemplate {
        title: "模仿一步",
        kind: SuggestionKind::MicroAction,
        desc: "找出他做的一件小事（比如早起、读书、一种说话方式），今天就试着模仿一次。",
        tag: "行动跟随",
    },
    SuggestionTemplate {
        title: "感恩日记",
        kind: SuggestionKind::Cognitive,
        desc: "写下3件你已经拥有、且别人可能也羡慕你的事情。",
        tag: "关注自我",
    },
];

const FATIGUE: &[SuggestionTemplate] = &[
    SuggestionTemplate {
        title: "5分钟离线",
        kind: SuggestionKind::MicroAction,
        desc: "设置5分钟倒计时。期间不看手机，不说话，只闭眼听周围的声音。",
        tag: "精力恢复",
    },
    SuggestionTemplate {
        title: "允许无为",
        kind: SuggestionKind::Cognitive,
        desc: "对自己说一遍：\"今天我已经尽力了，剩下的事情交给明天的我。\"然后心安理得地休息。",
        tag: "自我接纳",
    },
    SuggestionTemplate {
        title: "洗个热水澡",
        kind: SuggestionKind::MicroAction,
        desc: "在洗澡的时候，想象水流带走了所有的疲惫和压力。",
        tag: "感官疗愈",
    },
];

const CONFUSION: &[SuggestionTemplate] = &[
    SuggestionTemplate {
        title: "直觉筛选",
        kind: SuggestionKind::MicroAction,
        desc: "拿出硬币，为纠结的选项抛一次。在硬币落地前的那一秒，你心里希望它是哪一面？那个就是答案。",
        tag: "直觉唤醒",
    },
    SuggestionTemplate {
        title: "最小下一步",
        kind: SuggestionKind::MicroAction,
        desc: "不管大目标。只写下明天早上醒来后，必须要做的第一件事。越小越好。",
        tag: "启动行动",
    },
    SuggestionTemplate {
        title: "人生画布",
        kind: SuggestionKind::MicroAction,
        desc: "拿出一张白纸，画出你理想中5年后的生活场景，不要用文字，只用火柴人画。",
        tag: "视觉化",
    },
];

const NEUTRAL: &[SuggestionTemplate] = &[
    SuggestionTemplate {
        title: "情绪命名",
        kind: SuggestionKind::Cognitive,
        desc: "给这个感觉起个名字，用一个词或短语。有时候光是命名这个动作，就能让它变得不那么强烈。",
        tag: "觉察练习",
    },
    SuggestionTemplate {
        title: "深呼吸三次",
        kind: SuggestionKind::MicroAction,
        desc: "闭上眼睛，用鼻子吸气数到4，屏息数到4，用嘴呼气数到6。重复三次。",
        tag: "身心调节",
    },
];

pub fn catalog(emotion: Emotion) -> &'static [SuggestionTemplate] {
    match emotion {
        Emotion::Anxiety => ANXIETY,
        Emotion::Envy => ENVY,
        Emotion::Fatigue => FATIGUE,
        Emotion::Confusion => CONFUSION,
        Emotion::Neutral => NEUTRAL,
    }
}

/// Uniform pick from the emotion's catalog
pub fn pick<R: Rng>(emotion: Emotion, rng: &mut R) -> Suggestion {
    let entries = catalog(emotion);
    entries[rng.random_range(0..entries.len())].to_suggestion()
}

/// True when `suggestion` is one of the catalog entries for `emotion`
pub fn belongs_to(emotion: Emotion, suggestion: &Suggestion) -> bool {
    catalog(emotion)
        .iter()
        .any(|t| t.to_suggestion() == *suggestion)
}
