//! The closed set of hook kinds and their timeout policies.

/// The kinds of hook events the relay handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// A tool call awaiting permission.
    ToolPermission,
    /// An `AskUserQuestion` call.
    Question,
    /// Claude finished and may stop.
    Stop,
    /// An `ExitPlanMode` plan awaiting approval.
    PlanApproval,
    /// A one-way notification; no response is expected or read.
    Notification,
}

/// What a hook resolves to when no reply arrives before the deadline.
///
/// A hung approval channel must never block the session indefinitely, and
/// it must never silently grant a dangerous action. Each kind degrades
/// toward its least surprising, least privileged outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Emit nothing; Claude Code proceeds as if the hook were absent. The
    /// fail-closed default: no privileged action is performed.
    PassThrough,
    /// Allow the pending action (a stop, or a plan). The fail-open default
    /// for actions where blocking would wedge the session.
    Allow,
    /// The kind never waits.
    NoWait,
}

impl HookKind {
    /// The hook event name on the wire.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::ToolPermission | Self::Question => "PreToolUse",
            Self::Stop => "Stop",
            Self::PlanApproval => "PermissionRequest",
            Self::Notification => "Notification",
        }
    }

    /// The per-kind timeout table.
    #[must_use]
    pub fn timeout_policy(self) -> TimeoutPolicy {
        match self {
            // A silent no-op: the tool call falls back to the terminal
            // prompt, granting nothing.
            Self::ToolPermission | Self::Question => TimeoutPolicy::PassThrough,
            // An unanswered "Claude finished" should not trap the session
            // in a wait; let it stop. An unanswered plan likewise proceeds.
            Self::Stop | Self::PlanApproval => TimeoutPolicy::Allow,
            Self::Notification => TimeoutPolicy::NoWait,
        }
    }
}
