//! Shell command parsing utilities.
//!
//! Quote-aware splitting of shell commands and prefix extraction for the
//! bash always-allow flow.

use regex::Regex;

/// Commands where the first word is ambiguous and a 2-word prefix is needed.
/// E.g. `git log --oneline` yields prefix `git log`, not just `git`.
const TWO_WORD_PREFIX_COMMANDS: &[&str] = &[
    "git",
    "go",
    "npm",
    "npx",
    "docker",
    "uv",
    "cargo",
    "kubectl",
    "pip",
    "pip3",
    "poetry",
    "yarn",
    "pnpm",
    "brew",
    "apt",
    "make",
    "dotnet",
    "az",
    "aws",
    "gcloud",
    "terraform",
];

/// Split a shell command on `|`, `&&`, `||`, `;` respecting quoting.
///
/// The following constructs suppress delimiter recognition:
///
/// * Single quotes (`'...'`) — everything literal, no escaping
/// * Double quotes (`"..."`) — backslash escapes pass through
/// * Backtick substitution
/// * Parentheses / braces nesting (`$(…)`, `${…}`, subshells, process
///   substitution)
/// * Backslash escape outside quotes (`\|`, `\;` etc.)
#[must_use]
pub fn split_shell_commands(command: &str) -> Vec<String> {
    let chars: Vec<char> = command.chars().collect();
    let n = chars.len();
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    let mut in_single = false;
    let mut in_double = false;
    let mut in_backtick = false;
    let mut depth = 0u32; // nesting depth for () and {}

    while i < n {
        let c = chars[i];

        if in_single {
            current.push(c);
            if c == '\'' {
                in_single = false;
            }
            i += 1;
            continue;
        }

        if in_backtick {
            current.push(c);
            if c == '\\' && i + 1 < n {
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '`' {
                in_backtick = false;
            }
            i += 1;
            continue;
        }

        if in_double {
            current.push(c);
            if c == '\\' && i + 1 < n {
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }

        if depth > 0 {
            current.push(c);
            match c {
                '\'' => in_single = true,
                '"' => in_double = true,
                '`' => in_backtick = true,
                '(' | '{' => depth += 1,
                ')' | '}' => depth -= 1,
                _ => {}
            }
            i += 1;
            continue;
        }

        // Top-level parsing.
        if c == '\\' && i + 1 < n {
            current.push(c);
            current.push(chars[i + 1]);
            i += 2;
            continue;
        }

        match c {
            '\'' => {
                in_single = true;
                current.push(c);
            }
            '"' => {
                in_double = true;
                current.push(c);
            }
            '`' => {
                in_backtick = true;
                current.push(c);
            }
            '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            '|' if i + 1 < n && chars[i + 1] == '|' => {
                parts.push(std::mem::take(&mut current));
                i += 1;
            }
            '|' => {
                parts.push(std::mem::take(&mut current));
            }
            '&' if i + 1 < n && chars[i + 1] == '&' => {
                parts.push(std::mem::take(&mut current));
                i += 1;
            }
            ';' => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }

        i += 1;
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Extract command prefixes from a Bash command string.
///
/// Splits on `|`, `&&`, `||`, `;` into sub-commands (respecting quotes and
/// grouping characters). For each, extracts a 1- or 2-word prefix depending
/// on whether the base command is ambiguous.
///
/// ```
/// use claude_relay::shell::extract_command_prefixes;
///
/// assert_eq!(
///     extract_command_prefixes("git log --oneline | head -20"),
///     vec!["git log", "head"]
/// );
/// assert_eq!(
///     extract_command_prefixes("VAR=1 docker compose up"),
///     vec!["docker compose"]
/// );
/// ```
#[must_use]
pub fn extract_command_prefixes(command: &str) -> Vec<String> {
    if command.trim().is_empty() {
        return Vec::new();
    }

    // Env var assignments (VAR=val) at the start of a sub-command.
    let env_var_re =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=\S*$").expect("env var pattern is valid");

    let mut seen: Vec<String> = Vec::new();

    for sub in split_shell_commands(command) {
        let mut tokens = sub.split_whitespace().peekable();
        while tokens.peek().is_some_and(|t| env_var_re.is_match(t)) {
            tokens.next();
        }
        let Some(base) = tokens.next() else {
            continue;
        };

        let prefix = if TWO_WORD_PREFIX_COMMANDS.contains(&base) {
            match tokens.next() {
                Some(second) => format!("{base} {second}"),
                None => base.to_string(),
            }
        } else {
            base.to_string()
        };

        if !seen.iter().any(|p| *p == prefix) {
            seen.push(prefix);
        }
    }

    seen
}
