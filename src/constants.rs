//! System-wide tunables for the orchestration engine.

/// Default bound on ReAct reasoning iterations per task, matching the
/// design's "maxIterations (default 10)".
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// How many intervening log entries are tolerated between the `DOING`
/// entries of two tasks admitted in the same parallel burst before the
/// "near-simultaneous start" guarantee is considered violated.
pub const PARALLEL_START_LOG_SLACK: usize = 2;

/// Poll interval used by the queue's idle-wait loop when nothing is
/// currently admissible (e.g. waiting on a dependency to finish).
pub const TASK_POLL_INTERVAL_MS: u64 = 50;

/// Default retry budget for a single LLM call or tool invocation before the
/// error escalates to the owning task.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Base delay for the exponential-backoff retry helper.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

/// Default per-LLM-call timeout.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Default per-tool-call timeout.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Channel capacity for the log stream's subscriber fan-out broadcast.
pub const LOG_BROADCAST_CAPACITY: usize = 1024;

/// Default bind address for the optional HTTP surface.
pub const DEFAULT_API_HOST: &str = "127.0.0.1";

/// Default bind port for the optional HTTP surface.
pub const DEFAULT_API_PORT: u16 = 3000;
