//! Hook installer.
//!
//! Merges claude-relay hook entries into a Claude Code settings.json and
//! removes them again, preserving every entry the relay did not create.

use std::path::{Path, PathBuf};

use crate::config::{ClaudeSettings, HookEntry, HookMatcher, HooksConfig, SettingsError};

/// Timeout for the plan approval hook in seconds: plans deserve a long read.
const PLAN_APPROVAL_TIMEOUT: u32 = 1800;

/// Result of a hook installation operation.
#[derive(Debug)]
pub struct InstallResult {
    /// Path to the settings file that was modified.
    pub settings_path: PathBuf,
    /// Hook events that now carry relay entries.
    pub events_installed: Vec<&'static str>,
    /// Whether existing relay entries were replaced.
    pub replaced_existing: bool,
}

/// Result of a hook uninstallation operation.
#[derive(Debug)]
pub struct UninstallResult {
    /// Path to the settings file that was modified.
    pub settings_path: PathBuf,
    /// Hook events relay entries were removed from.
    pub events_removed: Vec<&'static str>,
}

impl UninstallResult {
    /// Whether anything was actually removed.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.events_removed.is_empty()
    }
}

/// Errors that can occur during hook installation.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),

    #[error("Could not determine current executable path: {0}")]
    CurrentExeError(std::io::Error),
}

/// Installs claude-relay hooks into Claude Code settings.
#[derive(Debug)]
pub struct HookInstaller {
    /// Path to the claude-relay binary.
    binary_path: PathBuf,
    /// Path to Claude settings.json.
    settings_path: PathBuf,
}

impl HookInstaller {
    /// Creates an installer for the given binary and Claude home.
    #[must_use]
    pub fn new(binary_path: PathBuf, claude_home: &Path) -> Self {
        Self {
            binary_path,
            settings_path: claude_home.join("settings.json"),
        }
    }

    /// Creates an installer using the current executable path.
    ///
    /// # Errors
    ///
    /// Returns an error if the current executable path cannot be determined.
    pub fn from_current_exe(claude_home: &Path) -> Result<Self, InstallError> {
        let binary_path = std::env::current_exe().map_err(InstallError::CurrentExeError)?;
        Ok(Self::new(binary_path, claude_home))
    }

    /// Returns the settings path.
    #[must_use]
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Generates the hook command for a given event subcommand.
    #[must_use]
    pub fn generate_hook_command(&self, event: &str) -> String {
        format!("{} hook {}", self.binary_path.display(), event)
    }

    fn pre_tool_use_entries(&self) -> Vec<HookMatcher> {
        let cmd = self.generate_hook_command("pre-tool-use");
        vec![
            HookMatcher::command("AskUserQuestion", HookEntry::command(&cmd, None)),
            HookMatcher::command("", HookEntry::command(&cmd, None)),
        ]
    }

    fn stop_entries(&self) -> Vec<HookMatcher> {
        vec![HookMatcher::command(
            "",
            HookEntry::command(self.generate_hook_command("stop"), None),
        )]
    }

    fn plan_approval_entries(&self) -> Vec<HookMatcher> {
        vec![HookMatcher::command(
            "ExitPlanMode",
            HookEntry::command(
                self.generate_hook_command("plan-approval"),
                Some(PLAN_APPROVAL_TIMEOUT),
            ),
        )]
    }

    fn notification_entries(&self) -> Vec<HookMatcher> {
        vec![HookMatcher::command(
            "",
            HookEntry::command(self.generate_hook_command("notify"), None),
        )]
    }

    /// Installs relay hooks for all four events into Claude settings.
    ///
    /// Existing relay entries are replaced; foreign entries are preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read or written.
    pub fn install(&self) -> Result<InstallResult, InstallError> {
        let mut settings = ClaudeSettings::load_from(&self.settings_path)?;
        let hooks = settings.hooks.get_or_insert_with(HooksConfig::default);

        let mut replaced_existing = false;
        let mut events_installed = Vec::new();

        let plans: [(&'static str, &mut Option<Vec<HookMatcher>>, Vec<HookMatcher>); 4] = [
            (
                "PreToolUse",
                &mut hooks.pre_tool_use,
                self.pre_tool_use_entries(),
            ),
            ("Stop", &mut hooks.stop, self.stop_entries()),
            (
                "PermissionRequest",
                &mut hooks.permission_request,
                self.plan_approval_entries(),
            ),
            (
                "Notification",
                &mut hooks.notification,
                self.notification_entries(),
            ),
        ];

        for (event, slot, entries) in plans {
            let list = slot.get_or_insert_with(Vec::new);
            let before = list.len();
            list.retain(|m| !m.is_relay_matcher());
            if list.len() < before {
                replaced_existing = true;
            }
            list.extend(entries);
            events_installed.push(event);
        }

        settings.save_to(&self.settings_path)?;

        Ok(InstallResult {
            settings_path: self.settings_path.clone(),
            events_installed,
            replaced_existing,
        })
    }

    /// Removes relay hooks from Claude settings.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read or written.
    pub fn uninstall(&self) -> Result<UninstallResult, InstallError> {
        let mut settings = ClaudeSettings::load_from(&self.settings_path)?;
        let mut events_removed = Vec::new();

        if let Some(ref mut hooks) = settings.hooks {
            let slots: [(&'static str, &mut Option<Vec<HookMatcher>>); 4] = [
                ("PreToolUse", &mut hooks.pre_tool_use),
                ("Stop", &mut hooks.stop),
                ("PermissionRequest", &mut hooks.permission_request),
                ("Notification", &mut hooks.notification),
            ];

            for (event, slot) in slots {
                let (removed, now_empty) = match slot.as_mut() {
                    Some(list) => {
                        let before = list.len();
                        list.retain(|m| !m.is_relay_matcher());
                        (list.len() < before, list.is_empty())
                    }
                    None => continue,
                };
                if removed {
                    events_removed.push(event);
                }
                if now_empty {
                    *slot = None;
                }
            }

            if hooks.is_empty() {
                settings.hooks = None;
            }
        }

        if !events_removed.is_empty() {
            settings.save_to(&self.settings_path)?;
        }

        Ok(UninstallResult {
            settings_path: self.settings_path.clone(),
            events_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn installer(claude_home: &Path) -> HookInstaller {
        HookInstaller::new(PathBuf::from("/usr/local/bin/claude-relay"), claude_home)
    }

    #[test]
    fn generate_hook_commands() {
        let home = TempDir::new().unwrap();
        let installer = installer(home.path());
        assert_eq!(
            installer.generate_hook_command("pre-tool-use"),
            "/usr/local/bin/claude-relay hook pre-tool-use"
        );
        assert_eq!(
            installer.generate_hook_command("stop"),
            "/usr/local/bin/claude-relay hook stop"
        );
    }

    #[test]
    fn install_into_empty_settings() {
        let home = TempDir::new().unwrap();
        let result = installer(home.path()).install().unwrap();

        assert_eq!(result.events_installed.len(), 4);
        assert!(!result.replaced_existing);

        let settings = ClaudeSettings::load_from(&result.settings_path).unwrap();
        let hooks = settings.hooks.unwrap();
        // PreToolUse gets the AskUserQuestion matcher plus the catch-all.
        assert_eq!(hooks.pre_tool_use.as_ref().unwrap().len(), 2);
        assert_eq!(hooks.stop.as_ref().unwrap().len(), 1);
        let plan = &hooks.permission_request.as_ref().unwrap()[0];
        assert_eq!(plan.matcher.as_deref(), Some("ExitPlanMode"));
        assert_eq!(plan.hooks[0].timeout, Some(1800));
        assert_eq!(hooks.notification.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn install_preserves_foreign_hooks() {
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("settings.json"),
            r#"{
                "hooks": {
                    "PreToolUse": [
                        {"matcher": "", "hooks": [{"type": "command", "command": "other-tool"}]}
                    ]
                }
            }"#,
        )
        .unwrap();

        installer(home.path()).install().unwrap();

        let settings =
            ClaudeSettings::load_from(&home.path().join("settings.json").clone()).unwrap();
        let pre_tool_use = settings.hooks.unwrap().pre_tool_use.unwrap();
        assert_eq!(pre_tool_use.len(), 3);
        assert!(pre_tool_use
            .iter()
            .any(|m| m.hooks.iter().any(|h| h.command == "other-tool")));
    }

    #[test]
    fn reinstall_replaces_stale_relay_entries() {
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("settings.json"),
            r#"{
                "hooks": {
                    "Stop": [
                        {"matcher": "", "hooks": [
                            {"type": "command", "command": "/old/claude-relay hook stop"}
                        ]}
                    ]
                }
            }"#,
        )
        .unwrap();

        let result = installer(home.path()).install().unwrap();
        assert!(result.replaced_existing);

        let settings =
            ClaudeSettings::load_from(&home.path().join("settings.json").clone()).unwrap();
        let stop = settings.hooks.unwrap().stop.unwrap();
        assert_eq!(stop.len(), 1);
        assert!(stop[0].hooks[0].command.starts_with("/usr/local/bin/"));
    }

    #[test]
    fn uninstall_removes_only_relay_hooks() {
        let home = TempDir::new().unwrap();
        installer(home.path()).install().unwrap();

        // Add a foreign hook after install.
        let path = home.path().join("settings.json");
        let mut settings = ClaudeSettings::load_from(&path).unwrap();
        settings
            .hooks
            .as_mut()
            .unwrap()
            .stop
            .as_mut()
            .unwrap()
            .push(HookMatcher::command(
                "",
                HookEntry::command("other-tool", None),
            ));
        settings.save_to(&path).unwrap();

        let result = installer(home.path()).uninstall().unwrap();
        assert!(result.changed());
        assert_eq!(result.events_removed.len(), 4);

        let settings = ClaudeSettings::load_from(&path).unwrap();
        let hooks = settings.hooks.unwrap();
        assert!(hooks.pre_tool_use.is_none());
        let stop = hooks.stop.unwrap();
        assert_eq!(stop.len(), 1);
        assert_eq!(stop[0].hooks[0].command, "other-tool");
    }

    #[test]
    fn uninstall_cleans_up_empty_hooks_section() {
        let home = TempDir::new().unwrap();
        installer(home.path()).install().unwrap();

        installer(home.path()).uninstall().unwrap();

        let settings =
            ClaudeSettings::load_from(&home.path().join("settings.json").clone()).unwrap();
        assert!(settings.hooks.is_none());
    }

    #[test]
    fn uninstall_from_clean_settings_is_a_noop() {
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("settings.json"), "{}").unwrap();
        let result = installer(home.path()).uninstall().unwrap();
        assert!(!result.changed());
    }

    #[test]
    fn install_preserves_other_settings_fields() {
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("settings.json"),
            r#"{"model": "opus", "nested": {"key": 123}}"#,
        )
        .unwrap();

        installer(home.path()).install().unwrap();

        let settings =
            ClaudeSettings::load_from(&home.path().join("settings.json").clone()).unwrap();
        assert_eq!(settings.other.get("model"), Some(&serde_json::json!("opus")));
        assert_eq!(
            settings.other.get("nested"),
            Some(&serde_json::json!({"key": 123}))
        );
    }
}
