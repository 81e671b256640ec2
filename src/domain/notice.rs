//! Outbound notices queued in the notification outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    DonationReceipt,
    Welcome,
    ContactMessage,
    PasswordOtp,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::DonationReceipt => "donation_receipt",
            NoticeKind::Welcome => "welcome",
            NoticeKind::ContactMessage => "contact_message",
            NoticeKind::PasswordOtp => "password_otp",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoticeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "donation_receipt" => Ok(NoticeKind::DonationReceipt),
            "welcome" => Ok(NoticeKind::Welcome),
            "contact_message" => Ok(NoticeKind::ContactMessage),
            "password_otp" => Ok(NoticeKind::PasswordOtp),
            other => Err(format!("unknown notice kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: Uuid,
    pub recipient: String,
    pub reply_to: Option<String>,
    pub kind: NoticeKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(recipient: impl Into<String>, kind: NoticeKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            reply_to: None,
            kind,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// A notice claimed from the outbox for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub notice: Notice,
    /// Delivery attempts including the current one.
    pub attempts: i32,
}
