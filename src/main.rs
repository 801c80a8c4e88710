use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;
use warp::Filter;

use sitterhub::config::{get_variable, get_variable_or};
use sitterhub::db::PgDb;
use sitterhub::environment::{Config, Environment};
use sitterhub::routes;
use sitterhub::urls::Urls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    #[cfg(feature = "env_logging")]
    let _guard = log::initialize_env_logging()?;

    let logger = initialize_logger();

    let main_port: u16 = get_variable("SITTERHUB_PORT")
        .parse()
        .expect("parse SITTERHUB_PORT as u16");
    let admin_port: u16 = get_variable("SITTERHUB_ADMIN_PORT")
        .parse()
        .expect("parse SITTERHUB_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("SITTERHUB_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("create database pool from SITTERHUB_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let urls = Arc::new(Urls::new(
        get_variable("SITTERHUB_BASE_URL"),
        get_variable_or("SITTERHUB_API_PATH", "api".to_owned()),
    ));

    let config = Config::new(get_variable_or("SITTERHUB_SESSION_HOURS", 24));
    let environment = Environment::new(logger.clone(), db, urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // a closed channel means shutdown is already under way
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

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
        let logger = logger.clone();

        let routes = routes::api(environment.clone())
            .recover(move |r| routes::format_rejection(logger.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();
        let logger = logger.clone();

        let routes = routes::admin::make_healthz_route(environment.clone())
            .or(routes::admin::make_termination_route(
                environment.clone(),
                terminate,
            ))
            .or(routes::admin::make_status_route(environment.clone()))
            .or(routes::admin::make_delete_route(environment.clone()))
            .recover(move |r| routes::format_rejection(logger.clone(), r));

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
