//! 内置 prompt 模板与渲染
//!
//! 模板用 `{name}` 占位，渲染为单遍替换：已替换进去的内容（网页文本、记忆块）里的花括号不会被再次解析。
//! 可通过 [prompts] 配置或 config/prompts/<name>.txt 覆盖。

use crate::tools::ToolCallRecord;

/// 无上一轮工具结果时的占位
pub const NO_TOOL_RESULTS: &str = "... no previous tool results ...";

pub const RESEARCH_PROMPT: &str = r#"Date: `{current_date}`.
You are an information analysis and exploration agent. You build a solution through systematic investigation.

## Investigation cycle
You work in repeated cycles:
1. Review the current workspace (your memory blocks)
2. Analyse the new tool results (or the initial task on the first round)
3. Update memory with new insights and track progress
4. Decide which tools to call next based on leads and information gaps
5. Repeat until the task is complete

## Memory
Your memory persists between cycles and consists of:
- **Status**: always the first line, IN_PROGRESS or DONE
- **Memory**: discrete blocks, each with a unique ID written as <abc-123>content</abc-123>

Keep one idea per block: discovered URLs (explored and pending), information gaps, actions already taken,
promising leads, key facts, contradictions. Always record the source URL of a fact.
Delete blocks that are outdated or no longer needed.

## Leads
You can make at most {max_tool_calls} tool calls per round, so store promising leads in memory for later rounds.

## Tools
{tools}

Examples:
- {"tool": "search", "input": "2023 renewable energy statistics"}
- {"tool": "scrape", "input": "https://example.com/energy-report"}

Never repeat an identical tool call. Always record valuable information from tool results in memory.

## Response format
Respond with exactly one JSON object matching this schema:

```json
{response_schema}
```

## Rules
- "add" creates a new memory block; the system assigns its ID.
- "delete" needs the exact ID of the block to remove.
- Never invent facts or URLs. Use only your memory and tool results.
- Anything not stored in a memory block is lost next round.
- Set status_update to "DONE" only when the task is fully solved, and only then include "answer" and "important_links".

Task:
```
{task}
```

Current workspace:
```
{workspace}
```

Tool results:
{tool_records}

Produce a valid JSON response in the format above. Do not rely on internal knowledge; discover information with the tools."#;

pub const SUMMARY_PROMPT: &str = r#"You are an assistant that condenses research notes into a final answer.
The notes below are a research workspace: a status line followed by memory blocks written as <id>content</id>.
Focus on facts that are confirmed (prices, opening hours, addresses, concrete recommendations).
Skip open questions and pending verification items.

Notes:
```
{content}
```

Write the best possible final answer from the confirmed facts."#;

/// 单遍替换 `{name}`；未知占位（如 JSON 示例中的花括号）原样保留
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (close, *v))
        });
        match replaced {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// 上一轮工具结果：每条一个 Source 段
pub fn format_tool_records(records: Option<&[ToolCallRecord]>) -> String {
    match records {
        Some(records) if !records.is_empty() => records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "Source {}: {}: {}\nResult:\n```\n{}\n```\n",
                    i + 1,
                    r.tool,
                    r.input,
                    r.output
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => NO_TOOL_RESULTS.to_string(),
    }
}

/// 可用工具段落：每行 `- **name**: description`
pub fn format_tools(tools: &[(String, String)]) -> String {
    tools
        .iter()
        .map(|(name, desc)| format!("- **{}**: {}", name, desc))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCallStatus;

    #[test]
    fn test_render_single_pass() {
        let out = render_template(
            "T={task} W={workspace} J={\"tool\": 1} {unknown}",
            &[("task", "find {workspace}"), ("workspace", "<a-1>x</a-1>")],
        );
        assert_eq!(out, "T=find {workspace} W=<a-1>x</a-1> J={\"tool\": 1} {unknown}");
    }

    #[test]
    fn test_render_unclosed_brace() {
        assert_eq!(render_template("a { b", &[("b", "x")]), "a { b");
    }

    #[test]
    fn test_format_tool_records() {
        assert_eq!(format_tool_records(None), NO_TOOL_RESULTS);
        assert_eq!(format_tool_records(Some(&[])), NO_TOOL_RESULTS);
        let records = vec![
            ToolCallRecord {
                tool: "search".to_string(),
                input: "q".to_string(),
                output: "r1".to_string(),
                status: ToolCallStatus::Ok,
            },
            ToolCallRecord {
                tool: "scrape".to_string(),
                input: "u".to_string(),
                output: "Tool execution failed: x".to_string(),
                status: ToolCallStatus::Failed,
            },
        ];
        assert_eq!(
            format_tool_records(Some(&records)),
            "Source 1: search: q\nResult:\n```\nr1\n```\n\nSource 2: scrape: u\nResult:\n```\nTool execution failed: x\n```\n"
        );
    }

    #[test]
    fn test_builtin_templates_have_placeholders() {
        for name in ["{current_date}", "{task}", "{workspace}", "{tool_records}", "{response_schema}"] {
            assert!(RESEARCH_PROMPT.contains(name), "missing {name}");
        }
        assert!(SUMMARY_PROMPT.contains("{content}"));
    }
}
