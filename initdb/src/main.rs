//! Applies the schema migrations, for local development and for the
//! HTTP tests that run against Postgres.

use std::env;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, info, initialize_logger};

fn main() {
    dotenv::dotenv().ok();

    let logger = initialize_logger();
    let connection_string = env::var("SITTERHUB_DB_CONNECTION_STRING")
        .expect("could not read SITTERHUB_DB_CONNECTION_STRING");
    let migrations = env::var("SITTERHUB_MIGRATIONS_DIR").unwrap_or_else(|_| "./migrations".to_owned());

    debug!(logger, "Connecting to database...");

    let client = Client::connect(&connection_string, NoTls).expect("could not connect to database");

    let mut movine = Movine::new(client);
    movine.set_migration_dir(&migrations);

    if movine.status().is_err() {
        debug!(logger, "Initializing movine...");
        movine.initialize().expect("failed to initialize movine")
    }

    info!(logger, "Running migrations..."; "directory" => &migrations);
    movine.up().expect("failed to run migrations");

    debug!(logger, "Completed initialization.");
}
