pub mod earning;
pub mod payment_transaction;
pub mod referral;
pub mod user;
pub mod withdrawal;

pub use earning::EarningSource;
pub use payment_transaction::PaymentStatus;
pub use withdrawal::{PaymentMethod, WithdrawalStatus};
