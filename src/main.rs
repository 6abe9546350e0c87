use dotenvy::dotenv;

use tally::api::{self, App};
use tally::config::Config;
use tally::database;
use tally::error::ApplicationError;
use tally::logger;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = Config::from_env()?;

    let _guard = logger::init(&config)?;

    let database = database::connect_with_retry(&config.database).await?;
    let app = App::new(database);

    api::serve(&config, app).await
}
