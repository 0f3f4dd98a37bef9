use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use tokio::sync::mpsc;
use warp::Filter;

use log::{info, initialize_logger, warn};
use reviewdb::config::{get_lifetime, get_port, get_profile_keyword, get_variable};
use reviewdb::db::PgDb;
use reviewdb::environment::{
    Config, Environment, DEFAULT_CODE_LIFETIME, DEFAULT_TOKEN_LIFETIME,
};
use reviewdb::mailer::LogMailer;
use reviewdb::routes;
use reviewdb::urls::Urls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let main_port = get_port("REVIEWDB_PORT");
    let admin_port = get_port("REVIEWDB_ADMIN_PORT");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("REVIEWDB_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string).await?;
    let db = Arc::new(PgDb::new(pool));

    let mailer = Arc::new(LogMailer::new(logger.clone()));
    let urls = Arc::new(Urls::new(get_variable("REVIEWDB_BASE_URL")));

    let profile_keyword = get_profile_keyword();
    info!(logger, "Configured profile keyword"; "keyword" => &profile_keyword);
    let token_lifetime = get_lifetime("REVIEWDB_TOKEN_LIFETIME_SECONDS", DEFAULT_TOKEN_LIFETIME);
    let code_lifetime =
        get_lifetime("REVIEWDB_CONFIRMATION_CODE_LIFETIME_SECONDS", DEFAULT_CODE_LIFETIME);
    info!(
        logger,
        "Configured credential lifetimes";
        "token_seconds" => token_lifetime.as_secs(),
        "code_seconds" => code_lifetime.as_secs()
    );
    let config = Config::new(profile_keyword)
        .with_token_lifetime(token_lifetime)
        .with_code_lifetime(code_lifetime);

    let environment = Environment::new(logger.clone(), db, mailer, urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = {
        let logger = logger.clone();

        Arc::new(move || {
            let termination_sender = termination_sender.clone();
            let logger = logger.clone();

            async move {
                if termination_sender.send(()).await.is_err() {
                    warn!(logger, "Termination already in progress");
                }
            }
            .boxed()
        })
    };

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::make_api(environment.clone());

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
