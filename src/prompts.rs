// Echo persona prompts - a warm companion guiding a short emotional check-in

use rand::Rng;

/// System prompt sent with every completion request.
///
/// Rounds 1-2 listen openly, rounds 3-4 dig into what triggered the feeling,
/// rounds 5-6 summarize gently and wind the call down.
pub const ECHO_SYSTEM_PROMPT: &str = r#"你是Echo，一位温暖、专业的情绪陪伴者。你的目标是通过3-4轮对话，帮助用户深入探索情绪触发点。

对话策略：
- 第1-2轮：温柔地倾听并提出开放性问题，让用户展开描述情绪和具体情境
- 第3-4轮：深入挖掘触发因素，帮助用户看到情绪背后的原因
- 第5-6轮：温柔总结并准备结束对话

对话风格：
- 用简短、温暖的语言（30-50字）
- 多用开放性问题引导用户思考
- 展现共情和理解
- 不评判、不说教
- 自然口语化，像朋友一样

例子：
"我听到了。能再多说说吗？是什么让你有这种感觉？"
"当这种情况发生时，你通常会怎么做？"
"你觉得这背后最核心的原因是什么？""#;

/// Shown by the shell before the user's first message. Never sent to the model.
pub const ECHO_GREETING: &str =
    "嗨，我是Echo。最近有什么触动你的瞬间吗？可以是一句话、一个画面，或者只是一种感觉。";

/// Canned inputs offered by the voice-input stand-in
pub const SAMPLE_INPUTS: [&str; 5] = [
    "我觉得最近压力好大，事情堆在一起...",
    "看到朋友圈大家都在晒旅行，突然觉得很羡慕...",
    "不知道为什么，今天特别不想动，很累...",
    "感觉工作没有什么意义，不知道该不该换...",
    "有点担心下周的汇报，怕讲不好...",
];

/// Trigger recorded for a finished conversation with no user message
pub const FALLBACK_TRIGGER: &str = "Conversation";

pub fn sample_input<R: Rng>(rng: &mut R) -> &'static str {
    SAMPLE_INPUTS[rng.random_range(0..SAMPLE_INPUTS.len())]
}
