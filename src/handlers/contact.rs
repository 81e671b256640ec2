use axum::{extract::State, Json};

use crate::error::AppError;
use crate::handlers::users::MessageResponse;
use crate::services::contact::ContactMessage;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/contact/sendMessage",
    request_body = ContactMessage,
    responses(
        (status = 200, description = "Message queued for the administrator", body = MessageResponse),
        (status = 400, description = "Missing or invalid fields")
    ),
    tag = "Contact"
)]
pub async fn send_message(
    State(state): State<AppState>,
    Json(input): Json<ContactMessage>,
) -> Result<Json<MessageResponse>, AppError> {
    state.contact.submit(input).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Your message has been sent successfully! We will get back to you soon."
            .to_string(),
    }))
}
