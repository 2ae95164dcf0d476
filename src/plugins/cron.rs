use std::sync::Arc;

use async_trait::async_trait;

use crate::{plugins::Plugin, prelude::*, state::AppState, sv};

/// Periodically re-queries the gateway for activation payments whose
/// callback never arrived and fails the definitively rejected ones.
pub struct Reconcile;

#[async_trait]
impl Plugin for Reconcile {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(Duration::from_secs(300));

      // skip the immediate first tick
      interval.tick().await;

      loop {
        interval.tick().await;

        let activation = sv::Activation::new(&app.db, &app.locks);
        match activation.reconcile_stale(&app.gateway).await {
          Ok(0) => {}
          Ok(swept) => info!("reconciliation swept {swept} stale activation(s)"),
          Err(err) => error!("reconciliation sweep failed: {err}"),
        }
      }
    });

    Ok(())
  }
}
