pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const REVISION: Option<&str> = option_env!("REVIEWDB_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("REVIEWDB_BUILD_TIMESTAMP");

/// The name under which the service identifies itself in logs and health checks.
pub const SERVICE: &str = "reviewdb";
