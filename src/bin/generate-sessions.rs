use std::error::Error;

use dotenv::dotenv;
use log::{debug, info, initialize_logger};
use structopt::StructOpt;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use sitterhub::config::{get_variable, get_variable_or};
use sitterhub::db::{Db, PgDb};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "generate-sessions",
    about = "Open sessions for the given accounts and print their bearer tokens"
)]
struct Opt {
    /// How many hours the sessions stay valid (defaults to SITTERHUB_SESSION_HOURS)
    #[structopt(long)]
    hours: Option<u16>,

    /// The account IDs to open sessions for
    #[structopt(parse(try_from_str = Uuid::parse_str))]
    ids: Vec<Uuid>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = initialize_logger();

    let connection_string = get_variable("SITTERHUB_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("create database pool from SITTERHUB_DB_CONNECTION_STRING");
    let db = PgDb::new(pool);

    let hours = opt
        .hours
        .unwrap_or_else(|| get_variable_or("SITTERHUB_SESSION_HOURS", 24));
    let expires_at = OffsetDateTime::now_utc() + Duration::hours(hours as i64);

    info!(logger, "Opening sessions for {:?}...", &opt.ids; "expires_at" => ?expires_at);

    let mut tokens = vec![];

    for id in &opt.ids {
        let logger = logger.new(log::o!("id" => format!("{}", id)));

        if db.retrieve_account(id).await?.is_none() {
            info!(logger, "Skipping unknown account");
            continue;
        }

        let token = db.create_session(id, expires_at).await?;
        debug!(logger, "Opened session: {}", token);
        tokens.push(format!("{}\t{}", id, token));
    }

    info!(logger, "Opened sessions:\n{}", tokens.join("\n"));

    Ok(())
}
