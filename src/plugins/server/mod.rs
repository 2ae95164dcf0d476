mod handlers;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use async_trait::async_trait;
use axum::{
  Router,
  routing::{get, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();

    tokio::spawn(async move {
      loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        governor_limiter.retain_recent();
      }
    });

    let router = Router::new()
      .route("/health", get(handlers::health))
      .route("/api/register", post(handlers::register))
      .route("/api/activate", post(handlers::activate))
      .route("/api/tasks/complete", post(handlers::complete_task))
      .route("/api/withdraw", post(handlers::withdraw))
      .route("/api/users/{id}", get(handlers::get_user))
      .route("/api/users/{id}/earnings", get(handlers::earnings))
      .route("/api/users/{id}/withdrawals", get(handlers::withdrawals))
      .route("/api/users/{id}/referrals", get(handlers::referral_stats))
      .route("/api/callbacks/stk", post(handlers::stk_callback))
      .route("/api/callbacks/b2c", post(handlers::b2c_callback))
      .layer(
        ServiceBuilder::new()
          .layer(TraceLayer::new_for_http())
          .layer(GovernorLayer::new(governor_conf))
          .layer(
            CorsLayer::new()
              .allow_origin(Any)
              .allow_methods(Any)
              .allow_headers(Any),
          ),
      )
      .with_state(app)
      .into_make_service_with_connect_info::<SocketAddr>();

    let port: u16 =
      std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server listening on {addr}");

    tokio::spawn(async move {
      let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
      axum::serve(listener, router).await.expect("Server error");
    });

    Ok(())
  }
}
