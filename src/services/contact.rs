use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::domain::{Notice, NoticeKind};
use crate::error::AppError;
use crate::ports::OutboxRepository;
use crate::validation::{
    sanitize_string, validate_email, validate_max_len, CONTACT_FIELD_MAX_LEN,
    CONTACT_MESSAGE_MAX_LEN,
};

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ContactMessage {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// Queues contact-form submissions for the site administrator.
pub struct ContactService {
    outbox: Arc<dyn OutboxRepository>,
    admin_email: String,
}

impl ContactService {
    pub fn new(outbox: Arc<dyn OutboxRepository>, admin_email: impl Into<String>) -> Self {
        Self {
            outbox,
            admin_email: admin_email.into(),
        }
    }

    pub async fn submit(&self, input: ContactMessage) -> Result<(), AppError> {
        let single_line = |v: &Option<String>| {
            v.as_deref()
                .map(sanitize_string)
                .filter(|v| !v.is_empty())
        };
        let message = input
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let (Some(name), Some(email), Some(subject), Some(message)) = (
            single_line(&input.name),
            single_line(&input.email),
            single_line(&input.subject),
            message,
        ) else {
            return Err(AppError::BadRequest(
                "All fields (Name, Email, Subject, Message) are required.".to_string(),
            ));
        };

        validate_max_len("name", &name, CONTACT_FIELD_MAX_LEN)?;
        validate_email("email", &email)?;
        validate_max_len("subject", &subject, CONTACT_FIELD_MAX_LEN)?;
        validate_max_len("message", &message, CONTACT_MESSAGE_MAX_LEN)?;

        let notice = Notice::new(
            self.admin_email.clone(),
            NoticeKind::ContactMessage,
            json!({ "name": name, "email": email, "subject": subject, "message": message }),
        )
        .with_reply_to(email);

        self.outbox.enqueue(&notice).await?;
        info!(notice_id = %notice.id, "contact message queued");
        Ok(())
    }
}
