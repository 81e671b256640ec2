//! Plain-text rendering of outbox notices.

use serde_json::Value;

use crate::domain::{Notice, NoticeKind};
use crate::ports::Mail;

const SIGNATURE: &str = "Best regards,\nThe FundRaiser Team";

#[derive(Debug, Clone)]
pub struct NoticeRenderer {
    from_name: String,
    default_reply_to: String,
}

impl NoticeRenderer {
    pub fn new(from_name: impl Into<String>, default_reply_to: impl Into<String>) -> Self {
        Self {
            from_name: from_name.into(),
            default_reply_to: default_reply_to.into(),
        }
    }

    pub fn render(&self, notice: &Notice) -> Mail {
        let field = |key: &str| match notice.payload.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let (subject, text) = match notice.kind {
            NoticeKind::DonationReceipt => (
                "Thank You for Your Donation!".to_string(),
                format!(
                    "Dear {},\n\nThank you for your generous donation of BDT {} to FundRaiser!\n\n\
                     Your transaction ID is: {}\n\n\
                     Your support helps us continue our work. We truly appreciate it!\n\n{SIGNATURE}",
                    field("firstName"),
                    field("amount"),
                    field("transactionId"),
                ),
            ),
            NoticeKind::Welcome => (
                "Welcome to FundRaiser!".to_string(),
                format!(
                    "Dear {},\n\nWelcome to FundRaiser! We're excited to have you join our community.\n\n\
                     Start exploring trending campaigns at {} and make a difference today.\n\n{SIGNATURE}",
                    field("firstName"),
                    field("frontendUrl"),
                ),
            ),
            NoticeKind::PasswordOtp => (
                "FundRaiser Password Update OTP".to_string(),
                format!(
                    "Dear {},\n\nYou have requested to update your password for your FundRaiser account.\n\n\
                     Your One-Time Password (OTP) is: {}\n\n\
                     This OTP is valid for 10 minutes. Please do not share this with anyone.\n\n\
                     If you did not request this, please ignore this email or contact support.\n\n{SIGNATURE}",
                    field("firstName"),
                    field("otp"),
                ),
            ),
            NoticeKind::ContactMessage => (
                format!("New Contact Form Submission: {}", field("subject")),
                format!(
                    "New Message from FundRaiser Contact Form\n\n\
                     Name: {}\nEmail: {}\nSubject: {}\nMessage: {}\n\n\
                     This email was sent from your FundRaiser website contact form.",
                    field("name"),
                    field("email"),
                    field("subject"),
                    field("message"),
                ),
            ),
        };

        Mail {
            to: notice.recipient.clone(),
            from_name: self.from_name.clone(),
            reply_to: Some(
                notice
                    .reply_to
                    .clone()
                    .unwrap_or_else(|| self.default_reply_to.clone()),
            ),
            subject,
            text,
        }
    }
}
