pub mod auth;
pub mod ip_filter;
pub mod request_logger;

pub use auth::CurrentDonor;
pub use ip_filter::IpFilterLayer;
pub use request_logger::{request_logger, RequestLogSettings};
