/// Module tags used to namespace and filter structured log output.
///
/// One tag per pipeline component (see `services::implementations`), plus a
/// `System` tag for bootstrap/orchestration and `Other` as an escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Rpc,
    Bus,
    Oracle,
    Parser,
    Backfill,
    Realtime,
    Coordinator,
    Worker,
    Store,
    Analytics,
    Health,
    Other(String),
}

impl LogTag {
    /// Key used for `--debug-<module>` / `--verbose-<module>` matching.
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Rpc => "rpc".to_string(),
            LogTag::Bus => "bus".to_string(),
            LogTag::Oracle => "oracle".to_string(),
            LogTag::Parser => "parser".to_string(),
            LogTag::Backfill => "backfill".to_string(),
            LogTag::Realtime => "realtime".to_string(),
            LogTag::Coordinator => "coordinator".to_string(),
            LogTag::Worker => "worker".to_string(),
            LogTag::Store => "store".to_string(),
            LogTag::Analytics => "analytics".to_string(),
            LogTag::Health => "health".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Plain (non-colored) tag string, used for file logging.
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM".to_string(),
            LogTag::Rpc => "RPC".to_string(),
            LogTag::Bus => "BUS".to_string(),
            LogTag::Oracle => "ORACLE".to_string(),
            LogTag::Parser => "PARSER".to_string(),
            LogTag::Backfill => "BACKFILL".to_string(),
            LogTag::Realtime => "REALTIME".to_string(),
            LogTag::Coordinator => "COORDINATOR".to_string(),
            LogTag::Worker => "WORKER".to_string(),
            LogTag::Store => "STORE".to_string(),
            LogTag::Analytics => "ANALYTICS".to_string(),
            LogTag::Health => "HEALTH".to_string(),
            LogTag::Other(s) => s.to_uppercase(),
        }
    }
}
