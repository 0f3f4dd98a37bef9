use std::error::Error;

use dotenv::dotenv;
use log::{info, initialize_logger, o};
use structopt::StructOpt;

use reviewdb::config::get_variable;
use reviewdb::db::{Db, PgDb};
use reviewdb::errors::BackendError;
use reviewdb::user::{Role, UserChanges};

#[derive(Debug, StructOpt)]
#[structopt(name = "grant-role", about = "Change the role of an existing account")]
struct Opt {
    /// The account to change
    username: String,

    /// One of `user`, `moderator` or `admin`
    role: Role,

    /// Also mark the account as a superuser
    #[structopt(long)]
    superuser: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = initialize_logger();
    let logger = logger.new(o!("username" => opt.username.clone()));

    let connection_string = get_variable("REVIEWDB_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string).await?;
    let db = PgDb::new(pool);

    let user = db
        .retrieve_user(&opt.username)
        .await?
        .ok_or_else(|| BackendError::not_found("user", &opt.username))?;

    info!(logger, "Granting role..."; "from" => %user.role(), "to" => %opt.role, "superuser" => opt.superuser);

    let user = db
        .update_user(user.id(), UserChanges::grant(opt.role, opt.superuser))
        .await?;

    info!(logger, "Role granted"; "role" => %user.role(), "superuser" => user.is_superuser());

    Ok(())
}
