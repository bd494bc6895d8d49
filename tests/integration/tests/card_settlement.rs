//! Integration test: card-rail payments from creation to deposit, with the
//! adapter talking HTTP to a local fake processor.

use std::sync::Arc;

use paysettle_core::{
    Currency, IdentityParams, InMemoryStore, PaymentParams, PaymentStatus, TransactionStatus,
};
use paysettle_integration_tests::{
    init_tracing, settlement_config, FakeProcessor, STEP_UP_CUSTOMER, STRIPE,
};
use paysettle_payment::{PaymentError, PaymentService, Reconciliation};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

async fn setup() -> (PaymentService, Arc<FakeProcessor>) {
    init_tracing();
    let (processor, base) = FakeProcessor::start().await;
    let config = settlement_config(&base, "http://127.0.0.1:9", "http://127.0.0.1:9");
    let service = PaymentService::from_config(Arc::new(InMemoryStore::new()), &config)
        .expect("service should build");
    (service, processor)
}

fn order(unique_ref: &str, amount: Decimal) -> PaymentParams {
    PaymentParams {
        tag: "checkout".into(),
        description: format!("checkout {}", unique_ref),
        unique_ref: unique_ref.into(),
        currency: Currency::USD,
        total_amount: amount,
        meta: json!({ "cart_id": 77 }),
    }
}

fn identity(role: &str, account: &str, amount: Decimal) -> IdentityParams {
    IdentityParams {
        identity_id: Uuid::now_v7(),
        role_name: role.into(),
        account: account.into(),
        amount,
        meta: json!({}),
    }
}

// =========================================================================
// Straight-through charge
// =========================================================================

#[tokio::test]
async fn test_card_payment_deposited() {
    let (service, processor) = setup().await;

    let mut payment = service
        .create(order("order-1", dec!(100)))
        .await
        .expect("create should succeed");
    payment.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    payment
        .add_identity(identity("payer", "cus_alice", dec!(100)))
        .await
        .expect("identity should attach");

    let outcome = payment.deposit().await.expect("deposit should succeed");
    assert_eq!(outcome, Reconciliation::Deposited);

    let fetched = service
        .fetch_by_ref("order-1")
        .await
        .expect("payment should load")
        .into_payment();
    assert_eq!(fetched.status, PaymentStatus::Deposited);
    assert_eq!(fetched.transactions.len(), 1);
    let tx = &fetched.transactions[0];
    assert_eq!(tx.status, TransactionStatus::Verified);
    assert_eq!(tx.amount, dec!(100));
    assert_eq!(tx.external_ref.as_deref(), Some("pi_1"));
    assert_eq!(tx.meta["charge"]["amount_minor"], 10_000);

    let forms = processor.forms();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0]["amount"], "10000");
    assert_eq!(forms[0]["currency"], "usd");
    assert_eq!(forms[0]["customer"], "cus_alice");
    assert_eq!(forms[0]["payment_method"], "pm_cus_alice");
    assert!(!forms[0].contains_key("transfer_data[destination]"));
}

#[tokio::test]
async fn test_card_payment_with_transfer_split() {
    let (service, processor) = setup().await;

    let mut payment = service
        .create(order("order-split", dec!(100)))
        .await
        .expect("create should succeed");
    payment.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    payment
        .add_identity(identity("payer", "cus_bob", dec!(100)))
        .await
        .expect("payer should attach");
    payment
        .add_identity(identity("seller", "acct_seller", dec!(90)))
        .await
        .expect("seller should attach");

    payment.deposit().await.expect("deposit should succeed");

    let forms = processor.forms();
    let form = &forms[0];
    assert_eq!(form["transfer_data[destination]"], "acct_seller");
    assert_eq!(form["on_behalf_of"], "acct_seller");
    assert_eq!(form["application_fee_amount"], "1000");
    assert_eq!(form["return_url"], "https://shop.example/return");

    let tx = &payment.payment().transactions[0];
    assert_eq!(tx.fee, dec!(10));
    assert_eq!(tx.meta["parties"].as_array().map(Vec::len), Some(2));
}

// =========================================================================
// Step-up authentication
// =========================================================================

#[tokio::test]
async fn test_step_up_then_confirm() {
    let (service, processor) = setup().await;

    let mut payment = service
        .create(order("order-3ds", dec!(25.50)))
        .await
        .expect("create should succeed");
    payment.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    payment
        .add_identity(identity("payer", STEP_UP_CUSTOMER, dec!(25.50)))
        .await
        .expect("identity should attach");

    let token = match payment.deposit().await.expect("deposit should park") {
        Reconciliation::OnHold { token } => token,
        other => panic!("expected step-up, got {:?}", other),
    };
    assert_eq!(token, "pi_1_secret_fake");
    assert_eq!(payment.payment().status, PaymentStatus::OnHold);
    assert_eq!(
        payment.payment().transaction_status,
        Some(TransactionStatus::ActionRequired)
    );

    // Customer has not finished authenticating yet.
    let early = payment.confirm_payment(&token).await;
    assert!(matches!(early, Err(PaymentError::ExternalService { .. })));
    assert_eq!(payment.payment().status, PaymentStatus::OnHold);

    processor.complete_step_up("pi_1");
    let outcome = payment
        .confirm_payment(&token)
        .await
        .expect("confirmation should succeed");
    assert_eq!(outcome, Reconciliation::Deposited);

    let fetched = service
        .fetch(payment.payment().id)
        .await
        .expect("payment should load")
        .into_payment();
    assert_eq!(fetched.status, PaymentStatus::Deposited);
    assert_eq!(fetched.continuation_token, None);
    assert_eq!(fetched.transactions.len(), 1);
    assert_eq!(fetched.transactions[0].status, TransactionStatus::Verified);
    assert_eq!(processor.forms().len(), 1);
}

#[tokio::test]
async fn test_confirm_with_foreign_token_rejected() {
    let (service, processor) = setup().await;

    let mut first = service
        .create(order("order-a", dec!(10)))
        .await
        .expect("create should succeed");
    first.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    first
        .add_identity(identity("payer", STEP_UP_CUSTOMER, dec!(10)))
        .await
        .expect("identity should attach");
    first.deposit().await.expect("deposit should park");

    let mut second = service
        .create(order("order-b", dec!(10)))
        .await
        .expect("create should succeed");
    second.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    second
        .add_identity(identity("payer", STEP_UP_CUSTOMER, dec!(10)))
        .await
        .expect("identity should attach");
    second.deposit().await.expect("deposit should park");

    processor.complete_step_up("pi_1");
    let result = second.confirm_payment("pi_1_secret_fake").await;
    assert!(matches!(result, Err(PaymentError::Validation(_))));
    assert_eq!(second.payment().status, PaymentStatus::OnHold);
}

// =========================================================================
// Customers, cards and connected accounts
// =========================================================================

#[tokio::test]
async fn test_onboarded_parties_settle_with_attached_card() {
    let (service, processor) = setup().await;
    let accounts = service.fiat_accounts(STRIPE).expect("stripe manages accounts");

    let customer = accounts
        .add_customer("buyer@shop.example")
        .await
        .expect("customer should be created");
    assert_eq!(customer.email.as_deref(), Some("buyer@shop.example"));
    let card = accounts
        .attach_card(&customer.id, "tok_visa")
        .await
        .expect("card should attach");
    assert_eq!(processor.default_card(&customer.id), Some(card.id.clone()));

    let seller = accounts.create_account("US").await.expect("account should be created");
    let link = accounts
        .create_account_link(&seller.id, "https://shop.example/onboarded")
        .await
        .expect("link should be created");
    assert!(link.url.ends_with(&seller.id));
    let fetched = accounts.fetch_account(&seller.id).await.expect("account should load");
    assert_eq!(fetched.country.as_deref(), Some("US"));

    let mut payment = service
        .create(order("order-onboarded", dec!(40)))
        .await
        .expect("create should succeed");
    payment.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    payment
        .add_identity(identity("payer", &customer.id, dec!(40)))
        .await
        .expect("payer should attach");
    payment
        .add_identity(identity("seller", &seller.id, dec!(36)))
        .await
        .expect("seller should attach");
    payment.deposit().await.expect("deposit should succeed");

    let forms = processor.forms();
    assert_eq!(forms[0]["payment_method"], card.id);
    assert_eq!(forms[0]["transfer_data[destination]"], seller.id);
    assert_eq!(forms[0]["application_fee_amount"], "400");
}

#[tokio::test]
async fn test_deleted_card_is_no_longer_charged() {
    let (service, _processor) = setup().await;
    let accounts = service.fiat_accounts(STRIPE).expect("stripe manages accounts");

    let customer = accounts.add_customer("once@shop.example").await.expect("customer");
    let card = accounts.attach_card(&customer.id, "tok_visa").await.expect("card");
    assert_eq!(accounts.list_cards(&customer.id).await.expect("cards").len(), 1);

    accounts.delete_card(&card.id).await.expect("card should detach");
    assert!(accounts.list_cards(&customer.id).await.expect("cards").is_empty());
    assert!(matches!(
        service.fiat_accounts("unknown"),
        Err(PaymentError::Validation(_))
    ));

    let mut payment = service
        .create(order("order-no-card", dec!(5)))
        .await
        .expect("create should succeed");
    payment.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    payment
        .add_identity(identity("payer", &customer.id, dec!(5)))
        .await
        .expect("identity should attach");

    let result = payment.deposit().await;
    assert!(matches!(result, Err(PaymentError::NotFound(_))));
    assert_eq!(payment.payment().transactions[0].status, TransactionStatus::Canceled);
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn test_unreachable_processor_cancels_attempt() {
    init_tracing();
    let config = settlement_config("http://127.0.0.1:9", "http://127.0.0.1:9", "http://127.0.0.1:9");
    let service = PaymentService::from_config(Arc::new(InMemoryStore::new()), &config)
        .expect("service should build");

    let mut payment = service
        .create(order("order-down", dec!(5)))
        .await
        .expect("create should succeed");
    payment.bind_fiat_rail(STRIPE).await.expect("bind should succeed");
    payment
        .add_identity(identity("payer", "cus_alice", dec!(5)))
        .await
        .expect("identity should attach");

    let result = payment.deposit().await;
    assert!(matches!(result, Err(PaymentError::ExternalService { .. })));

    let p = payment.payment();
    assert_eq!(p.status, PaymentStatus::Initiated);
    assert_eq!(p.transactions.len(), 1);
    assert_eq!(p.transactions[0].status, TransactionStatus::Canceled);
    assert!(p.transactions[0].meta["error"].is_string());
}
