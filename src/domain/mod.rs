//! Domain entities shared by services and adapters.

pub mod donor;
pub mod notice;
pub mod transaction;
pub mod transaction_id;

pub use donor::{AccountStatus, Address, Donor, DonorCredentials, NewDonor, OtpChallenge, Role};
pub use notice::{Notice, NoticeKind, OutboxEntry};
pub use transaction::{
    Closure, DonationTransaction, TransactionStatus, UnknownStatus, DONATION_CURRENCY,
};
pub use transaction_id::new_transaction_id;
