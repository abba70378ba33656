//! Slack message formatting.
//!
//! Converts Markdown to Slack mrkdwn and renders tool permission prompts,
//! questions, and plan approvals for display in a DM thread.

use regex::Regex;

/// Slack truncates long messages; keep ours under this many characters.
pub const MAX_SLACK_TEXT: usize = 3000;

/// Placeholder for a literal `*` emitted by an earlier conversion pass, so
/// the italic pass doesn't reinterpret it.
const STAR: char = '\u{1}';

const PERMISSION_HINT: &str =
    "\n:lock: _React :thumbsup: to allow, :thumbsdown: to deny, or reply with feedback_";
const PLAN_HINT: &str =
    "\n:clipboard: _React :thumbsup: to approve the plan, or reply with feedback to revise_";

const EMOJI_NUMS: &[&str] = &["1\u{fe0f}\u{20e3}", "2\u{fe0f}\u{20e3}", "3\u{fe0f}\u{20e3}", "4\u{fe0f}\u{20e3}"];

/// Truncate text to the Slack limit, appending an ellipsis.
#[must_use]
pub fn truncate(text: &str) -> String {
    truncate_to(text, MAX_SLACK_TEXT)
}

fn truncate_to(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Clip a value for embedding inside a code fence.
fn clip(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Markdown to Slack mrkdwn converter.
///
/// Pattern list adapted from the markdown-to-mrkdwn conversion tables in
/// common Slack tooling; code fences pass through untouched.
#[derive(Debug)]
pub struct MrkdwnRenderer {
    fence: Regex,
    table: Regex,
    passes: Vec<(Regex, String)>,
}

impl MrkdwnRenderer {
    /// Compile the conversion patterns.
    ///
    /// # Panics
    ///
    /// Never panics in practice; every pattern is a fixed, valid regex.
    #[must_use]
    pub fn new() -> Self {
        let star = STAR.to_string();
        let passes = [
            // Task lists
            (r"(?m)^(\s*)- \[ \] (.+)", "$1\u{2022} \u{2610} $2".to_string()),
            (r"(?m)^(\s*)- \[[xX]\] (.+)", "$1\u{2022} \u{2611} $2".to_string()),
            // Unordered lists
            (r"(?m)^(\s*)- (.+)", "$1\u{2022} $2".to_string()),
            // Images
            (r"!\[.*?\]\((.+?)\)", "<$1>".to_string()),
            // Horizontal rules, before the emphasis passes eat `***`
            (r"(?m)^(---|\*\*\*|___)\s*$", "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}".to_string()),
            // Bold+italic (***text***), before bold/italic
            (r"\*\*\*([^*\n]+?)\*\*\*", format!("{star}_${{1}}_{star}")),
            // Bold (**text** or __text__); the placeholder keeps the italic
            // pass from touching the emitted asterisks
            (r"\*\*(.+?)\*\*", format!("{star}$1{star}")),
            (r"__(.+?)__", format!("{star}$1{star}")),
            // Italic (*text*) on whatever single asterisks remain
            (r"\*([^*\n]+?)\*", "_${1}_".to_string()),
            // Headers become bold lines
            (r"(?m)^#{1,6} (.+?)\s*$", format!("{star}$1{star}")),
            // Links
            (r"\[(.+?)\]\((.+?)\)", "<$2|$1>".to_string()),
            // Strikethrough
            (r"~~(.+?)~~", "~$1~".to_string()),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("mrkdwn pattern is valid"),
                replacement,
            )
        })
        .collect();

        Self {
            fence: Regex::new(r"(?s)```.*?```").expect("fence pattern is valid"),
            table: Regex::new(r"(?m)^\|(.+)\|\s*$\n^\|[-:| ]+\|\s*$(\n^\|.+\|\s*$)*")
                .expect("table pattern is valid"),
            passes,
        }
    }

    /// Convert Markdown to Slack mrkdwn, preserving code blocks.
    #[must_use]
    pub fn render(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for fence in self.fence.find_iter(text) {
            out.push_str(&self.convert_segment(&text[last..fence.start()]));
            out.push_str(fence.as_str());
            last = fence.end();
        }
        out.push_str(&self.convert_segment(&text[last..]));
        out
    }

    fn convert_segment(&self, segment: &str) -> String {
        let mut text = self.convert_tables(segment);
        for (pattern, replacement) in &self.passes {
            text = pattern.replace_all(&text, replacement.as_str()).to_string();
        }
        text.replace(STAR, "*")
    }

    /// Convert Markdown tables to a readable label/value format.
    fn convert_tables(&self, text: &str) -> String {
        self.table
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let lines: Vec<&str> = caps[0].trim().lines().collect();
                let headers: Vec<String> = split_row(lines[0]);
                let mut blocks = Vec::new();
                for line in lines.iter().skip(2) {
                    let cells = split_row(line);
                    let fields: Vec<String> = headers
                        .iter()
                        .zip(cells.iter())
                        .map(|(h, c)| format!("{STAR}{h}:{STAR} {c}"))
                        .collect();
                    blocks.push(fields.join("\n"));
                }
                blocks.join("\n\n")
            })
            .to_string()
    }
}

impl Default for MrkdwnRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Convert Markdown to Slack mrkdwn with a fresh renderer.
#[must_use]
pub fn md_to_mrkdwn(text: &str) -> String {
    MrkdwnRenderer::new().render(text)
}

/// Format a tool call as a Slack permission prompt.
#[must_use]
pub fn format_tool_permission(
    tool_name: &str,
    tool_input: &serde_json::Value,
    unapproved_prefixes: Option<&[String]>,
) -> String {
    let get = |key: &str| {
        tool_input
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    };

    let mut text = match tool_name {
        "Bash" => {
            let cmd = get("command");
            let desc = get("description");
            let mut t = "Tool: `Bash`\n".to_string();
            if !desc.is_empty() {
                t.push_str(&format!("Description: {desc}\n"));
            }
            t.push_str(&format!("```\n{}\n```", clip(cmd, 2000)));
            t
        }
        "Edit" => {
            let fp = get("file_path");
            let old = clip(get("old_string"), 500);
            let new = clip(get("new_string"), 500);
            format!("Tool: `Edit` \u{2192} `{fp}`\nReplace:\n```\n{old}\n```\nWith:\n```\n{new}\n```")
        }
        "Write" => {
            let fp = get("file_path");
            let content = clip(get("content"), 1000);
            format!("Tool: `Write` \u{2192} `{fp}`\n```\n{content}\n```")
        }
        "NotebookEdit" => {
            let nb = get("notebook_path");
            let mode = tool_input
                .get("edit_mode")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("replace");
            let src = clip(get("new_source"), 1000);
            let mut t = format!("Tool: `NotebookEdit` ({mode}) \u{2192} `{nb}`\n");
            if !src.is_empty() {
                t.push_str(&format!("```\n{src}\n```"));
            }
            t
        }
        _ => {
            let input_str = clip(
                &serde_json::to_string_pretty(tool_input).unwrap_or_default(),
                1500,
            );
            format!("Tool: `{tool_name}`\n```\n{input_str}\n```")
        }
    };

    if let Some(prefixes) = unapproved_prefixes {
        if !prefixes.is_empty() {
            let listed = prefixes
                .iter()
                .map(|p| format!("`{p}`"))
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!(
                "\nNew commands: {listed}\n_React :fast_forward: to always allow these commands this session_"
            ));
        }
    }

    text.push_str(PERMISSION_HINT);
    truncate(&text)
}

/// Format a single `AskUserQuestion` entry for Slack.
#[must_use]
pub fn format_single_question(
    question: &serde_json::Value,
    question_num: usize,
    total: usize,
) -> String {
    let question_text = question
        .get("question")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let header = question
        .get("header")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let options = question
        .get("options")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();
    let multi = question
        .get("multiSelect")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let mut parts: Vec<String> = Vec::new();

    if total > 1 {
        parts.push(format!(":question: *Question {question_num}/{total}*\n"));
    } else {
        parts.push(":question: *Claude is asking:*\n".to_string());
    }

    if !header.is_empty() {
        parts.push(format!("*[{header}]*"));
    }
    parts.push(format!("{question_text}\n"));

    for (i, opt) in options.iter().enumerate() {
        let label = opt
            .get("label")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let desc = opt
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let num = EMOJI_NUMS
            .get(i)
            .map_or_else(|| format!("{}.", i + 1), ToString::to_string);
        let mut line = format!("{num} *{label}*");
        if !desc.is_empty() {
            line.push_str(&format!(" \u{2014} {desc}"));
        }
        parts.push(line);
    }

    if multi {
        parts.push("\n_Reply with one or more numbers (e.g. `1,3`) or your own text_".to_string());
    } else {
        parts.push("\n_Reply with a number or your own answer_".to_string());
    }

    truncate(&parts.join("\n"))
}

/// Format a plan approval prompt for Slack.
#[must_use]
pub fn format_plan_approval(plan: &str, allowed_prompts: Option<&[serde_json::Value]>) -> String {
    let mut parts: Vec<String> =
        vec![":memo: *Claude has a plan \u{2014} ready to code?*\n".to_string()];

    if !plan.is_empty() {
        parts.push(md_to_mrkdwn(plan));
    }

    if let Some(prompts) = allowed_prompts {
        if !prompts.is_empty() {
            parts.push("\n*Requested permissions:*".to_string());
            for p in prompts {
                let tool = p
                    .get("tool")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                let prompt = p
                    .get("prompt")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                parts.push(format!("\u{2022} `{tool}` \u{2014} {prompt}"));
            }
        }
    }

    parts.push(PLAN_HINT.to_string());
    truncate(&parts.join("\n"))
}

/// Header for the first message of a session's Slack thread.
#[must_use]
pub fn format_stop_header(short_id: &str, session_name: &str, project: &str) -> String {
    let mut lines = vec![
        ":white_check_mark: *Claude finished*".to_string(),
        format!("> *Session ID:* `{short_id}`"),
    ];
    if !session_name.is_empty() {
        let first_line = session_name.lines().next().unwrap_or_default().trim();
        lines.push(format!("> *Session name:* {first_line}"));
    }
    lines.push(format!("> *Project:* `{project}`"));
    lines.push("\n> Reply to this thread to continue the session.".to_string());
    lines.join("\n")
}

/// One-way notification that Claude Code finished.
#[must_use]
pub fn format_stop_notification(project: &str, stop_reason: &str) -> String {
    let mut message =
        format!(":white_check_mark: *Claude Code finished*\n*Project:* `{project}`");
    if !stop_reason.is_empty() {
        message.push_str(&format!("\n*Reason:* {stop_reason}"));
    }
    message
}

/// One-way notification that Claude Code needs attention.
#[must_use]
pub fn format_attention_notification(project: &str, body: &str) -> String {
    let mut message = format!(":bell: *Claude Code needs attention*\n*Project:* `{project}`");
    if !body.is_empty() {
        message.push_str(&format!("\n>{body}"));
    }
    message
}
