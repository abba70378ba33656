//! Permission rule parsing and matching.
//!
//! Rule formats follow Claude Code's permission syntax:
//!
//! - `"Bash"` — matches all Bash calls
//! - `"Bash(npm run *)"` — matches Bash calls whose command matches the glob
//! - `"Read(~/.zshrc)"` — matches Read calls for that file path

use std::path::Path;

use regex::Regex;

/// The tool-input field a rule's glob is matched against.
///
/// E.g. rule `Bash(npm run *)` matches against `tool_input["command"]`.
#[must_use]
pub fn specifier_field(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "Bash" => Some("command"),
        "Read" | "Edit" | "Write" => Some("file_path"),
        "NotebookEdit" => Some("notebook_path"),
        "WebFetch" => Some("url"),
        "WebSearch" => Some("query"),
        _ => None,
    }
}

/// The primary input value for a tool (file path for Read, command for Bash).
#[must_use]
pub fn tool_input_value(tool_name: &str, tool_input: &serde_json::Value) -> String {
    specifier_field(tool_name)
        .and_then(|field| tool_input.get(field))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Match a shell-style glob pattern (`*`, `?`) against a value.
#[must_use]
pub fn glob_match(pattern: &str, value: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() * 2 + 2);
    translated.push('^');
    for c in pattern.chars() {
        match c {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    // The pattern is fully escaped above; compilation cannot fail on user input.
    Regex::new(&translated).is_ok_and(|re| re.is_match(value))
}

/// Check if a tool call matches any permission rule in the list.
#[must_use]
pub fn tool_has_rule(tool_name: &str, tool_input: &serde_json::Value, rules: &[String]) -> bool {
    for rule in rules {
        if let Some((rule_tool, rule_pattern)) = split_rule(rule) {
            if rule_tool != tool_name {
                continue;
            }
            if specifier_field(tool_name).is_some() {
                let value = tool_input_value(tool_name, tool_input);
                if glob_match(rule_pattern, &value) {
                    return true;
                }
            }
        } else if rule == tool_name {
            return true;
        }
    }
    false
}

/// Split `"Tool(pattern)"` into its parts, or `None` for a bare tool rule.
fn split_rule(rule: &str) -> Option<(&str, &str)> {
    let open = rule.find('(')?;
    if !rule.ends_with(')') {
        return None;
    }
    Some((&rule[..open], &rule[open + 1..rule.len() - 1]))
}

/// Build a per-file session rule, e.g. `Edit(/path/to/file.rs)`.
///
/// Returns `None` when the tool's decisions are not cacheable or the call
/// has no primary input value.
#[must_use]
pub fn build_session_rule(
    policy: &crate::config::PolicyConfig,
    tool_name: &str,
    tool_input: &serde_json::Value,
) -> Option<String> {
    if !policy.is_cacheable(tool_name) {
        return None;
    }
    let value = tool_input_value(tool_name, tool_input);
    if value.is_empty() {
        return None;
    }
    Some(format!("{tool_name}({value})"))
}

/// Read Claude Code's permission rules from all settings files (read-only).
///
/// Checks (in order):
/// 1. `$CLAUDE_CONFIG_DIR/settings.json` (user-level, e.g. `~/.claude/`)
/// 2. `<cwd>/.claude/settings.local.json` (project-local, gitignored)
/// 3. `<cwd>/.claude/settings.json` (project-shared)
///
/// Returns a combined list of all allow + deny rule strings.
#[must_use]
pub fn load_cc_permission_rules(cwd: &str) -> Vec<String> {
    let mut rules = Vec::new();

    let config_dir = std::env::var("CLAUDE_CONFIG_DIR")
        .map(std::path::PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|h| h.join(".claude")));
    if let Some(dir) = config_dir {
        rules.extend(load_json_permissions(&dir.join("settings.json")));
    }

    if !cwd.is_empty() {
        let project = Path::new(cwd).join(".claude");
        rules.extend(load_json_permissions(&project.join("settings.local.json")));
        rules.extend(load_json_permissions(&project.join("settings.json")));
    }

    rules
}

/// Load the `permissions.allow` + `permissions.deny` lists from a JSON file.
fn load_json_permissions(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&content) else {
        return Vec::new();
    };

    let mut rules = Vec::new();
    for list in ["allow", "deny"] {
        if let Some(entries) = data
            .get("permissions")
            .and_then(|p| p.get(list))
            .and_then(serde_json::Value::as_array)
        {
            rules.extend(
                entries
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(String::from),
            );
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use serde_json::json;

    #[test]
    fn bare_rule_matches_tool() {
        assert!(tool_has_rule(
            "Bash",
            &json!({"command": "anything"}),
            &["Bash".to_string()]
        ));
    }

    #[test]
    fn glob_rule_matches_command() {
        let rules = vec!["Bash(npm run *)".to_string()];
        assert!(tool_has_rule("Bash", &json!({"command": "npm run test"}), &rules));
        assert!(tool_has_rule("Bash", &json!({"command": "npm run build"}), &rules));
        assert!(!tool_has_rule("Bash", &json!({"command": "cargo build"}), &rules));
    }

    #[test]
    fn rule_for_other_tool_never_matches() {
        assert!(!tool_has_rule(
            "Write",
            &json!({"file_path": "/tmp/x"}),
            &["Bash".to_string()]
        ));
    }

    #[test]
    fn file_rule_matches_exact_path() {
        let rules = vec!["Read(~/.zshrc)".to_string()];
        assert!(tool_has_rule("Read", &json!({"file_path": "~/.zshrc"}), &rules));
        assert!(!tool_has_rule("Read", &json!({"file_path": "/etc/passwd"}), &rules));
    }

    #[test]
    fn glob_match_escapes_regex_metacharacters() {
        assert!(glob_match("a+b", "a+b"));
        assert!(!glob_match("a+b", "aab"));
        assert!(glob_match("file.?", "file.c"));
        assert!(glob_match("grep -E *", "grep -E (a|b) file"));
    }

    #[test]
    fn tool_input_value_picks_specifier_field() {
        assert_eq!(
            tool_input_value("Bash", &json!({"command": "ls"})),
            "ls"
        );
        assert_eq!(
            tool_input_value("Edit", &json!({"file_path": "/a/b.rs"})),
            "/a/b.rs"
        );
        assert_eq!(tool_input_value("Task", &json!({"prompt": "x"})), "");
    }

    #[test]
    fn build_session_rule_for_cacheable_tool() {
        let policy = PolicyConfig::default();
        let rule = build_session_rule(&policy, "Edit", &json!({"file_path": "/a/b.rs"}));
        assert_eq!(rule.as_deref(), Some("Edit(/a/b.rs)"));
    }

    #[test]
    fn build_session_rule_skips_uncacheable_or_empty() {
        let policy = PolicyConfig::default();
        assert!(build_session_rule(&policy, "Bash", &json!({"command": "ls"})).is_none());
        assert!(build_session_rule(&policy, "Edit", &json!({})).is_none());
    }

    #[test]
    fn load_rules_from_settings_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let project = tmp.path().join("project");
        let claude_dir = project.join(".claude");
        std::fs::create_dir_all(&claude_dir).unwrap();
        std::fs::write(
            claude_dir.join("settings.json"),
            r#"{"permissions": {"allow": ["Bash(npm run *)"], "deny": ["Write(/etc/*)"]}}"#,
        )
        .unwrap();

        let rules = load_cc_permission_rules(&project.to_string_lossy());
        assert!(rules.contains(&"Bash(npm run *)".to_string()));
        assert!(rules.contains(&"Write(/etc/*)".to_string()));
    }

    #[test]
    fn malformed_settings_yield_no_rules() {
        let tmp = tempfile::TempDir::new().unwrap();
        let claude_dir = tmp.path().join(".claude");
        std::fs::create_dir_all(&claude_dir).unwrap();
        std::fs::write(claude_dir.join("settings.json"), "not json").unwrap();

        let rules = load_cc_permission_rules(&tmp.path().to_string_lossy());
        assert!(rules.is_empty());
    }
}
