//! 🎯 COORDINATOR CONSTANTS: System-wide configuration values
//! DECISION ARCHAEOLOGY: Each constant includes reasoning for its specific value
//! AUDIT: Verify these values align with deployment constraints before changing them

// 🌐 NETWORK DEFAULTS
pub const DEFAULT_COORDINATOR_HOST: &str = "0.0.0.0";
pub const DEFAULT_COORDINATOR_PORT: u16 = 8766;
pub const DEFAULT_DASHBOARD_HOST: &str = "0.0.0.0";
pub const DEFAULT_DASHBOARD_PORT: u16 = 8765;

// ⚙️ TASK LIFECYCLE CONFIGURATION
/// 🚦 MAX QUEUE SIZE: Memory protection for a long-lived coordinator process
/// Why: 1000 tasks ≈ 1MB RAM (1KB avg task) provides safety margin
/// Alternative: 10K (rejected: potential OOM on a small instance), 100 (rejected: too restrictive)
pub const MAX_QUEUE_SIZE: usize = 1000;

/// 📚 MAX COMPLETED LOG ENTRIES: Historical data retention vs memory usage balance
/// Why: 10K entries provides a reasonable audit trail without unbounded growth
pub const MAX_COMPLETED_LOG: usize = 10_000;

/// Dashboard snapshot shows only the most recent completed tasks.
pub const DASHBOARD_RECENT_COMPLETED: usize = 50;

// 💓 HEARTBEAT & HEALTH MONITORING
/// Agent emits a heartbeat this often by default.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Coordinator sweeps agent health on this cadence.
/// Why: 30s matches the source system's monitor loop; frequent enough to catch
/// stalled agents without dominating the event loop.
pub const AGENT_MONITOR_INTERVAL_SECS: u64 = 30;

/// An agent silent for longer than this is marked `unresponsive` (not removed).
pub const AGENT_UNRESPONSIVE_THRESHOLD_SECS: i64 = 60;

// 🔁 AGENT CLIENT RECONNECT BACKOFF
/// Initial and floor reconnect delay.
pub const RECONNECT_BACKOFF_INITIAL_SECS: u64 = 5;
/// Ceiling the exponential backoff saturates at.
pub const RECONNECT_BACKOFF_MAX_SECS: u64 = 60;

/// Default idle period before the agent re-requests work when auto-request is enabled.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;

/// Default cap on concurrently assigned tasks per agent.
pub const DEFAULT_MAX_CONCURRENT_TASKS: u32 = 5;

// 🧮 ROUTING SCORE WEIGHTS
/// Base score every candidate starts from before factors are applied.
pub const SCORE_BASE: f64 = 100.0;
/// Weight of the specialization success-rate factor.
pub const WEIGHT_SPECIALIZATION: f64 = 40.0;
/// Partial credit when only the bare capability (no stats yet) is declared.
pub const SPECIALIZATION_CAPABILITY_ONLY_BONUS: f64 = 20.0;
/// Per-unit-of-load penalty subtracted from the score.
pub const LOAD_PENALTY_PER_TASK: f64 = 15.0;
/// Weight of the overall historical success-rate factor.
pub const WEIGHT_HISTORICAL_SUCCESS: f64 = 20.0;
/// Numerator of the speed bonus for high-priority tasks: `10 / (avg_duration + 1)`.
pub const SPEED_BONUS_NUMERATOR: f64 = 10.0;
/// Flat bonus when the agent recently handled a description-similar task.
pub const SIMILAR_CONTEXT_BONUS: f64 = 15.0;
/// Window within which a prior completion counts toward the similar-context bonus.
pub const SIMILAR_CONTEXT_WINDOW_SECS: i64 = 600;
/// Minimum shared lowercase whitespace-tokenized words to count as "similar".
pub const SIMILAR_CONTEXT_MIN_SHARED_WORDS: usize = 3;
/// Flat bonus for an agent that has been idle longer than the fairness window.
pub const IDLE_FAIRNESS_BONUS: f64 = 10.0;
/// Idle duration after which the fairness bonus kicks in.
pub const IDLE_FAIRNESS_WINDOW_SECS: i64 = 300;

/// Eligibility load ceiling for a non-idle agent: busy agents under this load still qualify.
pub const ELIGIBLE_LOAD_CEILING: u32 = 3;

/// Smoothing factor applied to the old value in the rolling-average update.
/// `new = ROLLING_AVG_OLD_WEIGHT * old + ROLLING_AVG_SAMPLE_WEIGHT * sample`.
pub const ROLLING_AVG_OLD_WEIGHT: f64 = 0.8;
pub const ROLLING_AVG_SAMPLE_WEIGHT: f64 = 0.2;

/// Rebalance flags an agent once its load exceeds this multiple of the mean...
pub const REBALANCE_MEAN_MULTIPLIER: f64 = 1.5;
/// ...and also exceeds this absolute floor, so a quiet fleet isn't flagged over noise.
pub const REBALANCE_ABSOLUTE_FLOOR: u32 = 2;

/// `recommend()` only opines on a specialization with at least this many samples.
pub const RECOMMEND_MIN_SAMPLES: u32 = 5;
/// Below this success rate (with enough samples) `recommend()` suggests deprioritizing.
pub const RECOMMEND_LOW_SUCCESS_THRESHOLD: f64 = 0.5;
/// Above this success rate (with enough samples) `recommend()` suggests preferring.
pub const RECOMMEND_HIGH_SUCCESS_THRESHOLD: f64 = 0.9;

// 📡 TELEMETRY
/// Bounded ring size for recent structured events.
pub const TELEMETRY_EVENT_RING_CAPACITY: usize = 1000;
/// Bounded rolling sample window per metric.
pub const TELEMETRY_METRIC_WINDOW: usize = 500;

// 🗂️ SHARED CONTEXT
/// Conflicting updates closer together than this are subject to conflict resolution.
pub const CONTEXT_CONFLICT_WINDOW_SECS: i64 = 1;
