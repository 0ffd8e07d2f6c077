/// Centralized argument handling for the ingestion pipeline binary.
///
/// Consolidates command-line flag parsing so individual modules never touch
/// `std::env::args()` directly. The logger's own `--debug-<module>` /
/// `--verbose-<module>` flags are parsed separately in `logger::config`; this
/// module covers everything else (run mode, backfill/realtime overrides,
/// help/version).
use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage.
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments. Used by tests to override the
/// default `env::args()` collection.
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

// =============================================================================
// CORE FLAGS
// =============================================================================

/// Run mode — required to actually start the service manager.
pub fn is_run_enabled() -> bool {
    has_arg("--run")
}

/// Restricts the Mode Coordinator (C6) to backfill only, skipping the
/// realtime indexer even after the target count is reached.
pub fn is_backfill_only_enabled() -> bool {
    has_arg("--backfill-only")
}

/// Skips backfill entirely and starts the realtime indexer directly.
pub fn is_realtime_only_enabled() -> bool {
    has_arg("--realtime-only")
}

/// Get configured max exit retries (defaults to 3). Clamped 1-10.
pub fn get_max_exit_retries() -> u32 {
    get_arg_value("--max-exit-retries")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(3)
        .clamp(1, 10)
}

// =============================================================================
// HELP SYSTEM
// =============================================================================

pub fn print_help() {
    println!("dln-indexer - Cross-chain order protocol transaction ingestion pipeline");
    println!();
    println!("USAGE:");
    println!("    dln-indexer [FLAGS]");
    println!();
    println!("CORE FLAGS:");
    println!("    --run                     Start the service manager");
    println!("    --backfill-only           Never start the realtime indexer");
    println!("    --realtime-only           Skip backfill, start the realtime indexer directly");
    println!("    --max-exit-retries <n>    Max startup retry attempts (1-10, default 3)");
    println!("    --help, -h                Show this help message");
    println!();
    println!("DEBUG FLAGS (see logger::config for the full tag list):");
    println!("    --debug-rpc, --debug-bus, --debug-oracle, --debug-parser,");
    println!("    --debug-backfill, --debug-realtime, --debug-coordinator,");
    println!("    --debug-worker, --debug-store, --debug-analytics, --debug-health");
    println!();
    println!("EXAMPLES:");
    println!("    dln-indexer --run                        # Start normally");
    println!("    dln-indexer --run --backfill-only        # Backfill only, no realtime tail");
    println!("    dln-indexer --run --debug-worker          # Debug the enrichment worker");
}

// =============================================================================
// UTILITY FUNCTIONS
// =============================================================================

pub fn get_enabled_debug_modes() -> Vec<String> {
    get_cmd_args()
        .iter()
        .filter_map(|arg| arg.strip_prefix("--debug-").map(String::from))
        .collect()
}

pub fn print_debug_info() {
    let args = get_cmd_args();
    logger::debug(LogTag::System, &format!("Command-line arguments: {:?}", args));

    let enabled_modes = get_enabled_debug_modes();
    if enabled_modes.is_empty() {
        logger::debug(LogTag::System, "No debug modes enabled");
    } else {
        logger::debug(LogTag::System, &format!("Enabled debug modes: {:?}", enabled_modes));
    }
}

// =============================================================================
// COMMON ARGUMENT PATTERNS
// =============================================================================

pub mod patterns {
    use super::*;

    pub fn is_help_requested() -> bool {
        has_arg("--help") || has_arg("-h")
    }

    pub fn is_version_requested() -> bool {
        has_arg("--version") || has_arg("-V")
    }

    pub fn is_quiet_mode() -> bool {
        has_arg("--quiet") || has_arg("-q")
    }

    pub fn is_verbose_mode() -> bool {
        has_arg("--verbose") || has_arg("-v")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_arg_detects_flag() {
        set_cmd_args(vec!["dln-indexer".to_string(), "--run".to_string()]);
        assert!(is_run_enabled());
        assert!(!is_backfill_only_enabled());
    }

    #[test]
    fn get_arg_value_reads_following_token() {
        set_cmd_args(vec![
            "dln-indexer".to_string(),
            "--max-exit-retries".to_string(),
            "7".to_string(),
        ]);
        assert_eq!(get_max_exit_retries(), 7);
    }

    #[test]
    fn get_max_exit_retries_clamps_out_of_range() {
        set_cmd_args(vec![
            "dln-indexer".to_string(),
            "--max-exit-retries".to_string(),
            "99".to_string(),
        ]);
        assert_eq!(get_max_exit_retries(), 10);
    }
}
