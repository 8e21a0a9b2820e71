//! 从模型原始输出中恢复指令对象
//!
//! 模型输出可能夹带推理过程、解释文字、代码块或多个候选对象。
//! 做法：收集所有括号平衡的 `{...}` 片段（含嵌套），按字符长度从长到短依次尝试解析，
//! 返回第一个能解析为 JSON 对象的片段。当模型在正文里引用格式示例时可能选错对象，保持该启发式不变。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn thinking_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?:<think>)?.*?</think>").ok())
        .as_ref()
}

/// 去掉 `<think>...</think>` 推理段（也处理缺少开标签、只有 `</think>` 的输出）
pub fn strip_thinking(text: &str) -> String {
    match thinking_re() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// 所有括号平衡的 `{...}` 片段，按闭合位置排列
///
/// 每个 `{` 各自向后扫描，并单独维护 JSON 字符串状态，前面被截断的片段不会影响后面的对象。
pub fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, &str)> = text
        .char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(|(start, _)| span_end(text, start).map(|end| (end, &text[start..=end])))
        .collect();
    // 稳定排序：同一闭合位置时外层（起点更早）在前
    spans.sort_by_key(|&(end, _)| end);
    spans.into_iter().map(|(_, span)| span).collect()
}

/// 从 `start` 处的 `{` 开始，返回与之配对的 `}` 位置
fn span_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// 返回最长的可解析 JSON 对象；找不到时返回 None
pub fn extract_largest_json(text: &str) -> Option<Map<String, Value>> {
    let mut candidates = balanced_spans(text);
    // 稳定排序：等长时保持闭合顺序
    candidates.sort_by_key(|span| std::cmp::Reverse(span.chars().count()));

    candidates.into_iter().find_map(|span| {
        match serde_json::from_str::<Value>(span) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(len = span.len(), error = %e, "candidate is not valid JSON");
                None
            }
        }
    })
}
