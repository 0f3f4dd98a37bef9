use std::env;
use std::time::Duration;

/// The profile keyword used when `REVIEWDB_PROFILE_KEYWORD` is not set.
pub const DEFAULT_PROFILE_KEYWORD: &str = "me";

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the value of the named environment variable parsed as a port,
/// or panics.
pub fn get_port(name: &str) -> u16 {
    get_variable(name)
        .parse()
        .unwrap_or_else(|_| panic!("parse {} as u16", name))
}

/// Returns the reserved keyword addressing the current user's own record.
pub fn get_profile_keyword() -> String {
    env::var("REVIEWDB_PROFILE_KEYWORD").unwrap_or_else(|_| DEFAULT_PROFILE_KEYWORD.to_owned())
}

/// Returns the named environment variable as a number of seconds, or
/// `default` when it is not set. Panics if it is set but not a number.
pub fn get_lifetime(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Duration::from_secs)
            .unwrap_or_else(|_| panic!("parse {} as a number of seconds", name)),
        Err(_) => default,
    }
}
