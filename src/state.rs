use migration::{Migrator, MigratorTrait};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{prelude::*, sv::Daraja};

pub struct AppState {
  pub db: DatabaseConnection,
  pub gateway: Daraja,
  pub locks: UserLocks,
}

impl AppState {
  pub async fn new(db_url: &str) -> anyhow::Result<Self> {
    let db = Database::connect(db_url).await?;
    Migrator::up(&db, None).await?;

    let gateway = Daraja::from_env();
    if !gateway.collection_ready() {
      warn!("collection credentials missing, activation payments will fail");
    }
    if !gateway.disbursement_ready() {
      warn!("disbursement credentials missing, M-Pesa withdrawals will fail");
    }

    Ok(Self { db, gateway, locks: UserLocks::default() })
  }
}

/// Per-user mutexes serializing the activation, reward, and withdrawal
/// sequences. Reward computation locks the referrer, everything else the
/// acting user.
#[derive(Default)]
pub struct UserLocks {
  inner: DashMap<i64, Arc<Mutex<()>>>,
}

impl UserLocks {
  pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
    let lock = self.inner.entry(user_id).or_default().clone();
    lock.lock_owned().await
  }
}
