pub mod activation;
pub mod balance;
pub mod daraja;
pub mod referral;
#[cfg(test)]
pub mod test_utils;
pub mod user;
pub mod withdrawal;

pub use activation::Activation;
pub use balance::Balance;
pub use daraja::Daraja;
pub use referral::Referral;
pub use user::User;
pub use withdrawal::Withdrawal;
