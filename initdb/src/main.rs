//! A helper program to initialize the database, optionally with a first
//! superuser.

use std::env;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, info, initialize_logger, warn};
use reviewdb::config::get_profile_keyword;
use reviewdb::user::NewUser;

fn main() {
    dotenv::dotenv().ok();

    let logger = initialize_logger();
    let connection_string = env::var("REVIEWDB_DB_CONNECTION_STRING")
        .expect("could not read REVIEWDB_DB_CONNECTION_STRING");

    debug!(logger, "Connecting to database...");

    let client = Client::connect(&connection_string, NoTls).expect("could not connect to database");

    let mut movine = Movine::new(client);
    movine.set_migration_dir("./migrations");

    if movine.status().is_err() {
        debug!(logger, "Initializing movine...");
        movine.initialize().expect("failed to initialize movine")
    }

    debug!(logger, "Running migrations...");
    movine.up().expect("failed to run migrations");

    if let Ok(bootstrap) = env::var("REVIEWDB_BOOTSTRAP_ADMIN") {
        let admin = parse_bootstrap_admin(&bootstrap, &get_profile_keyword())
            .unwrap_or_else(|e| panic!("invalid REVIEWDB_BOOTSTRAP_ADMIN: {}", e));

        let mut client =
            Client::connect(&connection_string, NoTls).expect("could not connect to database");

        let inserted = client
            .execute(
                include_str!("bootstrap_admin.sql"),
                &[&admin.username(), &admin.email()],
            )
            .expect("failed to create superuser");

        if inserted == 0 {
            warn!(logger, "Superuser not created; username or email taken"; "username" => admin.username());
        } else {
            info!(logger, "Created superuser"; "username" => admin.username());
        }
    }

    debug!(logger, "Completed initialization.");
}

/// Reads `username:email`, normalized and checked the same way as a signup.
fn parse_bootstrap_admin(value: &str, reserved: &str) -> Result<NewUser, String> {
    let (username, email) = value
        .split_once(':')
        .ok_or_else(|| "expected username:email".to_owned())?;

    let admin = NewUser::signup(username, email);
    admin.validate(reserved).map_err(|e| e.to_string())?;

    Ok(admin)
}
