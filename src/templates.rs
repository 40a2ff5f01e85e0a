//! Canned script payloads.
//!
//! Each template is a small self-limiting script body with a duration
//! placeholder. The registry substitutes the validated duration before
//! handing the body to the executor, so a dispatched payload can never
//! outlive its requested window by more than the executor's own slack.

/// Placeholder substituted with the requested duration in milliseconds.
pub const DURATION_PLACEHOLDER: &str = "__DURATION_MS__";

const BUSY_LOOP_BODY: &str = r#"const deadline = Date.now() + __DURATION_MS__;
while (Date.now() < deadline) {
    // spin
}
"#;

const TICK_LOOP_BODY: &str = r#"(async () => {
    const deadline = Date.now() + __DURATION_MS__;
    while (Date.now() < deadline) {
        await Promise.resolve();
    }
})();
"#;

const TIMER_CHAIN_BODY: &str = r#"const deadline = Date.now() + __DURATION_MS__;
function step() {
    if (Date.now() < deadline) {
        setTimeout(step, 50);
    }
}
step();
"#;

/// The built-in payload catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    /// Synchronous spin; the harshest target for cancellation.
    BusyLoop,
    /// Microtask churn; yields constantly but never idles.
    TickLoop,
    /// Self-rescheduling timers; idle between ticks.
    TimerChain,
}

impl ScriptTemplate {
    pub const ALL: [ScriptTemplate; 3] = [
        ScriptTemplate::BusyLoop,
        ScriptTemplate::TickLoop,
        ScriptTemplate::TimerChain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScriptTemplate::BusyLoop => "busy-loop",
            ScriptTemplate::TickLoop => "tick-loop",
            ScriptTemplate::TimerChain => "timer-chain",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScriptTemplate::BusyLoop => "synchronous busy-wait until the deadline",
            ScriptTemplate::TickLoop => "microtask loop that re-queues itself until the deadline",
            ScriptTemplate::TimerChain => "timer chain that re-arms every 50ms until the deadline",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Render the script body with the duration substituted in.
    pub fn render(&self, duration_ms: u64) -> String {
        let body = match self {
            ScriptTemplate::BusyLoop => BUSY_LOOP_BODY,
            ScriptTemplate::TickLoop => TICK_LOOP_BODY,
            ScriptTemplate::TimerChain => TIMER_CHAIN_BODY,
        };
        body.replace(DURATION_PLACEHOLDER, &duration_ms.to_string())
    }
}

impl std::fmt::Display for ScriptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
