pub mod accounts;
pub mod contact;
pub mod dispatcher;
pub mod notices;
pub mod notification;
pub mod outcome;
pub mod reconciler;
pub mod session;
pub mod tokens;

pub use accounts::AccountService;
pub use contact::ContactService;
pub use dispatcher::{run_dispatcher, OutboxDispatcher};
pub use notices::NoticeRenderer;
pub use notification::{confirm, ConfirmedPayment, IpnPayload, NotificationValidator};
pub use outcome::OutcomeResolver;
pub use reconciler::{IpnAck, TransactionReconciler};
pub use session::{parse_donation_amount, InitiatedSession, SessionInitiator};
pub use tokens::TokenIssuer;
