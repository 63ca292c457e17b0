//! Monitor configuration: environment-variable loading (§6 "Environment"),
//! grounded on the original's `GETENV_STRING`/`GETENV_NUMBER` macros.
//!
//! Configuration loading is out of scope for the core per §1, but the
//! variables a deployed monitor needs and their defaults are exactly
//! those the original reads at `initExec` time — reproduced here rather
//! than invented so a deployment carries its settings over unchanged.

use std::env;

/// Resolved monitor configuration.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Database connection pool size bound.
    pub pool_size: u32,
    /// Directory program artifacts are loaded from.
    pub load_module_dir: String,
    /// Directory copybook JSON (`<mapset>.js`) is read from.
    pub copybook_dir: String,
    /// Database connection string (libpq-style for the Postgres backend).
    pub db_connect_string: String,
    /// Display date/time template used by `adjust_date_format_to_db`.
    pub cob_date_format: String,
}

fn getenv_string(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn getenv_number(var: &str, default: u32) -> u32 {
    env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        MonitorConfig {
            pool_size: getenv_number("TPCORE_MEM_POOL_SIZE", 100),
            load_module_dir: getenv_string("TPCORE_LOADMOD_DIR", "../loadmod"),
            copybook_dir: getenv_string("TPCORE_JSON_DIR", "../copybooks"),
            db_connect_string: getenv_string("TPCORE_DB_CONNECT_STRING", "dbname=tpcore"),
            cob_date_format: getenv_string("TPCORE_DISPLAY_DATE_FORMAT", "YYYY-MM-dd.hh:mm:ss.uuuu"),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_documented_values_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("TPCORE_MEM_POOL_SIZE");
        env::remove_var("TPCORE_LOADMOD_DIR");
        let cfg = MonitorConfig::from_env();
        assert_eq!(cfg.pool_size, 100);
        assert_eq!(cfg.load_module_dir, "../loadmod");
    }

    #[test]
    fn environment_overrides_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("TPCORE_MEM_POOL_SIZE", "42");
        let cfg = MonitorConfig::from_env();
        assert_eq!(cfg.pool_size, 42);
        env::remove_var("TPCORE_MEM_POOL_SIZE");
    }
}
