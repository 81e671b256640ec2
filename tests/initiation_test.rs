mod common;

use common::{dec, TestContext};
use donation_core::error::{ErrorKind, PaymentError};
use donation_core::ports::DonationRepository;
use donation_core::services::parse_donation_amount;
use serde_json::json;

#[tokio::test]
async fn negative_amount_is_rejected_before_anything_is_created() {
    let ctx = TestContext::new();
    let donor = ctx.donor("rahim@example.com").await;

    let err = parse_donation_amount(Some(&json!(-10))).expect_err("invalid");
    assert!(matches!(err, PaymentError::InvalidAmount(_)));
    assert_eq!(err.kind(), ErrorKind::CallerInput);

    let err = ctx
        .state
        .initiator
        .initiate(&donor, &dec("-10"))
        .await
        .expect_err("invalid");
    assert!(matches!(err, PaymentError::InvalidAmount(_)));

    assert!(ctx.store.donor_transactions(donor.id).await.unwrap().is_empty());
    assert!(ctx.gateway.sessions.lock().unwrap().is_empty());
}

#[test]
fn amount_parsing_accepts_only_positive_numbers() {
    assert_eq!(
        parse_donation_amount(Some(&json!(500))).unwrap(),
        dec("500.00")
    );
    assert_eq!(
        parse_donation_amount(Some(&json!(99.999))).unwrap(),
        dec("100.00")
    );
    assert!(parse_donation_amount(Some(&json!("500"))).is_err());
    assert!(parse_donation_amount(Some(&json!(0))).is_err());
    assert!(parse_donation_amount(Some(&json!(0.001))).is_err());
    assert!(parse_donation_amount(None).is_err());
}

#[tokio::test]
async fn session_request_carries_donor_profile_and_defaults() {
    let ctx = TestContext::new();
    let donor = ctx.donor("rahim@example.com").await;

    let session = ctx
        .state
        .initiator
        .initiate(&donor, &dec("500"))
        .await
        .expect("initiated");
    assert!(session.redirect_url.ends_with(&session.transaction_id));
    assert!(session.transaction_id.starts_with("TR"));

    let sessions = ctx.gateway.sessions.lock().unwrap().clone();
    assert_eq!(sessions.len(), 1);
    let request = &sessions[0];
    assert_eq!(request.transaction_id, session.transaction_id);
    assert_eq!(request.amount.to_string(), "500.00");
    assert_eq!(request.currency, "BDT");
    assert_eq!(request.product_name, "Donation by Rahim Uddin");
    assert_eq!(request.customer.postcode, "1000");
    assert_eq!(request.customer.country, "Bangladesh");
    assert_eq!(request.customer.address_line1, "N/A");
    assert_eq!(
        request.success_url,
        format!(
            "https://api.donate.example.org/api/payment/success?tran_id={}",
            session.transaction_id
        )
    );
    assert_eq!(request.ipn_url, "https://api.donate.example.org/api/payment/ipn");

    let stored = ctx.store.donor_transactions(donor.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].amount, dec("500.00"));
}

#[tokio::test]
async fn gateway_refusal_persists_nothing() {
    let ctx = TestContext::new();
    let donor = ctx.donor("rahim@example.com").await;
    *ctx.gateway.refuse_sessions.lock().unwrap() = true;

    let err = ctx
        .state
        .initiator
        .initiate(&donor, &dec("250.00"))
        .await
        .expect_err("gateway refused");
    assert!(matches!(err, PaymentError::GatewayInitiationFailed(_)));
    assert!(err.is_retryable());
    assert!(ctx.store.donor_transactions(donor.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn donor_without_email_cannot_initiate() {
    let ctx = TestContext::new();
    let mut donor = ctx.donor("rahim@example.com").await;
    donor.email = String::new();

    let err = ctx
        .state
        .initiator
        .initiate(&donor, &dec("250.00"))
        .await
        .expect_err("incomplete profile");
    assert!(matches!(err, PaymentError::InvalidDonorProfile(_)));
    assert!(ctx.gateway.sessions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn each_initiation_gets_a_distinct_transaction() {
    let ctx = TestContext::new();
    let donor = ctx.donor("rahim@example.com").await;

    let first = ctx.state.initiator.initiate(&donor, &dec("10")).await.unwrap();
    let second = ctx.state.initiator.initiate(&donor, &dec("10")).await.unwrap();
    assert_ne!(first.transaction_id, second.transaction_id);
    assert_eq!(ctx.store.donor_transactions(donor.id).await.unwrap().len(), 2);
}
