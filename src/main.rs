mod entity;
mod error;
mod plugins;
mod prelude;
mod state;
mod sv;
mod utils;

use std::env;

use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{prelude::*, state::AppState};

#[tokio::main]
async fn main() {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "tuzo=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let db_url = env::var("DATABASE_URL")
    .unwrap_or_else(|_| "sqlite:tuzo.db?mode=rwc".into());

  info!("Starting Tuzo v{}", env!("CARGO_PKG_VERSION"));

  let app = Arc::new(
    AppState::new(&db_url).await.expect("failed to initialize app state"),
  );

  plugins::App::new()
    .register(plugins::server::Plugin)
    .register(plugins::cron::Reconcile)
    .run(app)
    .await;

  tokio::signal::ctrl_c().await.expect("failed to listen for shutdown");
  info!("shutting down");
}
