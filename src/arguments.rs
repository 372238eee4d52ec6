/// Centralized argument handling for nasbridge
///
/// Consolidates command-line argument parsing and debug flag checking so
/// individual modules never touch `std::env` directly.
///
/// Features:
/// - Centralized CMD_ARGS storage with thread-safe access
/// - Debug flag checking functions for all modules
/// - Unified argument parsing utilities
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
/// Thread-safe singleton that stores arguments for access throughout the application
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
/// Used by tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
/// Returns a vector clone to avoid holding the mutex lock
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => {
            // Fallback to env::args if mutex is poisoned
            env::args().collect()
        }
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
/// Returns None if the flag is not found or has no value
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
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

/// Webserver / WebSocket hub debug mode
pub fn is_debug_webserver_enabled() -> bool {
    has_arg("--debug-webserver")
}

/// Engine RPC client debug mode
pub fn is_debug_engine_enabled() -> bool {
    has_arg("--debug-engine")
}

/// Circuit breaker debug mode
pub fn is_debug_breaker_enabled() -> bool {
    has_arg("--debug-breaker")
}

/// Polling bridge debug mode
pub fn is_debug_poller_enabled() -> bool {
    has_arg("--debug-poller")
}

/// Checks whether any debug mode is active
pub fn is_any_debug_enabled() -> bool {
    get_cmd_args().iter().any(|a| a.starts_with("--debug-"))
}

/// Help request check
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

/// Path to the config file (defaults handled by the caller)
pub fn get_config_path() -> Option<String> {
    get_arg_value("--config")
}

/// Print available command-line options
pub fn print_help() {
    println!("nasbridge - NAS management gateway realtime layer");
    println!();
    println!("USAGE:");
    println!("    nasbridge [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>       Config file path (default: nasbridge.json)");
    println!("    --debug-webserver     Enable webserver/hub debug logging");
    println!("    --debug-engine        Enable engine RPC debug logging");
    println!("    --debug-breaker       Enable circuit breaker debug logging");
    println!("    --debug-poller        Enable polling bridge debug logging");
    println!("    -h, --help            Print this help message");
}

/// Print active debug modes at startup
pub fn print_debug_info() {
    let mut active = Vec::new();
    if is_debug_webserver_enabled() {
        active.push("webserver");
    }
    if is_debug_engine_enabled() {
        active.push("engine");
    }
    if is_debug_breaker_enabled() {
        active.push("breaker");
    }
    if is_debug_poller_enabled() {
        active.push("poller");
    }
    if !active.is_empty() {
        println!("Debug modes enabled: {}", active.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_lookup() {
        set_cmd_args(vec![
            "nasbridge".to_string(),
            "--config".to_string(),
            "/tmp/test.json".to_string(),
            "--debug-engine".to_string(),
        ]);

        assert!(has_arg("--debug-engine"));
        assert!(!has_arg("--debug-webserver"));
        assert_eq!(get_arg_value("--config").as_deref(), Some("/tmp/test.json"));
        assert_eq!(get_arg_value("--missing"), None);
    }
}
