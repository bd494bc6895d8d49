//! Stripe-compatible card rail.
//!
//! Charges are created as payment intents against the customer's stored card
//! and confirmed in the same call. The same adapter manages customers, their
//! cards and the connected accounts that transfer splits are routed to.
//! Credentials belong to the adapter instance and are sent as bearer auth on
//! every request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paysettle_core::config::FiatServiceConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{http_client, read_json};
use crate::amount::to_minor_units;
use crate::error::SettlementError;
use crate::traits::{FiatAccounts, FiatRail};
use crate::types::{
    AccountLink, Card, ChargeOutcome, ChargeRequest, ChargeStatus, ConnectedAccount,
    ContinuationOutcome, Customer,
};

const STATUS_SUCCEEDED: &str = "succeeded";
const STATUS_REQUIRES_ACTION: &str = "requires_action";
const STATUS_REQUIRES_CONFIRMATION: &str = "requires_confirmation";

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    currency: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodList {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethod {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    card: Option<CardDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct CardDetails {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<u32>,
    exp_year: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeAccount {
    id: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
}

#[derive(Debug, Deserialize)]
struct StripeAccountLink {
    url: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

pub struct StripeRail {
    config: FiatServiceConfig,
    client: reqwest::Client,
}

impl StripeRail {
    pub fn new(config: FiatServiceConfig) -> Result<Self, SettlementError> {
        let client = http_client(&config.name, config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        reference: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SettlementError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| SettlementError::http(&self.config.name, reference, e))?;
        read_json(&self.config.name, reference, response).await
    }

    fn decode<T: DeserializeOwned>(&self, reference: &str, raw: &Value) -> Result<T, SettlementError> {
        T::deserialize(raw).map_err(|e| SettlementError::decode(&self.config.name, reference, e))
    }

    fn decode_intent(&self, reference: &str, raw: Value) -> Result<(PaymentIntent, Value), SettlementError> {
        let intent = self.decode(reference, &raw)?;
        Ok((intent, raw))
    }

    fn decode_card(&self, reference: &str, raw: Value) -> Result<Card, SettlementError> {
        let method: PaymentMethod = self.decode(reference, &raw)?;
        let details = method.card.unwrap_or_default();
        Ok(Card {
            id: method.id,
            customer: method.customer,
            brand: details.brand,
            last4: details.last4,
            exp_month: details.exp_month,
            exp_year: details.exp_year,
            raw,
        })
    }

    fn decode_account(&self, reference: &str, raw: Value) -> Result<ConnectedAccount, SettlementError> {
        let account: StripeAccount = self.decode(reference, &raw)?;
        Ok(ConnectedAccount {
            id: account.id,
            country: account.country,
            charges_enabled: account.charges_enabled,
            payouts_enabled: account.payouts_enabled,
            details_submitted: account.details_submitted,
            raw,
        })
    }

    /// Last card instrument stored for `customer`.
    async fn card_for(&self, customer: &str) -> Result<String, SettlementError> {
        self.list_cards(customer)
            .await?
            .pop()
            .map(|card| card.id)
            .ok_or_else(|| SettlementError::not_found(&self.config.name, customer))
    }

    fn intent_form(
        &self,
        request: &ChargeRequest,
        payment_method: String,
    ) -> Result<Vec<(&'static str, String)>, SettlementError> {
        let amount = to_minor_units(request.amount, request.currency)?;
        let mut form = vec![
            ("amount", amount.to_string()),
            ("currency", request.currency.code().to_lowercase()),
            ("customer", request.payer_account.clone()),
            ("payment_method", payment_method),
            ("description", request.description.clone()),
            ("confirm", "true".to_string()),
            ("capture_method", "automatic".to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("automatic_payment_methods[allow_redirects]", "never".to_string()),
            (
                "payment_method_options[card][request_three_d_secure]",
                "automatic".to_string(),
            ),
            ("setup_future_usage", "off_session".to_string()),
        ];

        if let (Some(transfer), Some(fee)) = (&request.transfer, request.platform_fee()) {
            let fee = to_minor_units(fee, request.currency)?;
            form.push(("confirmation_method", "automatic".to_string()));
            if let Some(callback) = &self.config.callback_url {
                form.push(("return_url", callback.clone()));
            }
            form.push(("application_fee_amount", fee.to_string()));
            form.push(("on_behalf_of", transfer.destination.clone()));
            form.push(("transfer_data[destination]", transfer.destination.clone()));
        }

        Ok(form)
    }

    async fn confirm_intent(&self, id: &str) -> Result<(PaymentIntent, Value), SettlementError> {
        let path = format!("/v1/payment_intents/{}/confirm", id);
        let raw = self.send(id, self.client.post(self.url(&path))).await?;
        self.decode_intent(id, raw)
    }
}

/// Payment intent id behind a continuation token, which may be the id itself
/// or a client secret of the form `{id}_secret_{nonce}`.
pub fn intent_id_from_token(token: &str) -> &str {
    token
        .split_once("_secret_")
        .map(|(id, _)| id)
        .unwrap_or(token)
}

#[async_trait]
impl FiatRail for StripeRail {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, SettlementError> {
        let payment_method = self.card_for(&request.payer_account).await?;
        let form = self.intent_form(request, payment_method)?;

        let raw = self
            .send(
                &request.payer_account,
                self.client.post(self.url("/v1/payment_intents")).form(&form),
            )
            .await?;
        let (mut intent, mut raw) = self.decode_intent(&request.payer_account, raw)?;

        if intent.status == STATUS_REQUIRES_CONFIRMATION {
            tracing::info!(
                service = %self.config.name,
                intent = %intent.id,
                "Payment intent needs explicit confirmation"
            );
            (intent, raw) = self.confirm_intent(&intent.id).await?;
        }

        let status = match intent.status.as_str() {
            STATUS_SUCCEEDED => ChargeStatus::Confirmed,
            STATUS_REQUIRES_ACTION => ChargeStatus::RequiresAction {
                token: intent.client_secret.clone().unwrap_or_else(|| intent.id.clone()),
            },
            other => {
                return Err(SettlementError::external(
                    &self.config.name,
                    &intent.id,
                    format!("payment intent is not completed and is in the {} status", other),
                ))
            }
        };

        tracing::info!(
            service = %self.config.name,
            intent = %intent.id,
            status = %intent.status,
            "Card charge submitted"
        );

        Ok(ChargeOutcome {
            external_id: intent.id,
            amount_minor: intent.amount,
            currency: intent.currency,
            status,
            raw,
            observed_at: Utc::now(),
        })
    }

    async fn get_continuation(&self, token: &str) -> Result<ContinuationOutcome, SettlementError> {
        let id = intent_id_from_token(token);
        let path = format!("/v1/payment_intents/{}", id);
        let raw = self.send(id, self.client.get(self.url(&path))).await?;
        let (intent, raw) = self.decode_intent(id, raw)?;

        Ok(ContinuationOutcome {
            confirmed: intent.status == STATUS_SUCCEEDED,
            external_id: intent.id,
            status: intent.status,
            raw,
        })
    }

    fn service_name(&self) -> &str {
        &self.config.name
    }
}

#[async_trait]
impl FiatAccounts for StripeRail {
    async fn add_customer(&self, email: &str) -> Result<Customer, SettlementError> {
        let raw = self
            .send(
                email,
                self.client
                    .post(self.url("/v1/customers"))
                    .form(&[("email", email)]),
            )
            .await?;
        let customer: StripeCustomer = self.decode(email, &raw)?;
        tracing::info!(service = %self.config.name, customer = %customer.id, "Customer created");
        Ok(Customer {
            id: customer.id,
            email: customer.email,
            raw,
        })
    }

    async fn attach_card(
        &self,
        customer: &str,
        card_token: &str,
    ) -> Result<Card, SettlementError> {
        let raw = self
            .send(
                customer,
                self.client
                    .post(self.url("/v1/payment_methods"))
                    .form(&[("type", "card"), ("card[token]", card_token)]),
            )
            .await?;
        let created = self.decode_card(customer, raw)?;

        let path = format!("/v1/payment_methods/{}/attach", created.id);
        let raw = self
            .send(
                &created.id,
                self.client
                    .post(self.url(&path))
                    .form(&[("customer", customer)]),
            )
            .await?;
        let card = self.decode_card(&created.id, raw)?;

        let path = format!("/v1/customers/{}", customer);
        self.send(
            customer,
            self.client
                .post(self.url(&path))
                .form(&[("invoice_settings[default_payment_method]", card.id.as_str())]),
        )
        .await?;

        tracing::info!(
            service = %self.config.name,
            customer = %customer,
            card = %card.id,
            "Card attached as default instrument"
        );
        Ok(card)
    }

    async fn list_cards(&self, customer: &str) -> Result<Vec<Card>, SettlementError> {
        let raw = self
            .send(
                customer,
                self.client
                    .get(self.url("/v1/payment_methods"))
                    .query(&[("customer", customer), ("type", "card")]),
            )
            .await?;
        let list: PaymentMethodList = self.decode(customer, &raw)?;
        list.data
            .into_iter()
            .map(|entry| self.decode_card(customer, entry))
            .collect()
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), SettlementError> {
        let path = format!("/v1/payment_methods/{}/detach", card_id);
        self.send(card_id, self.client.post(self.url(&path))).await?;
        tracing::info!(service = %self.config.name, card = %card_id, "Card detached");
        Ok(())
    }

    async fn create_account(&self, country: &str) -> Result<ConnectedAccount, SettlementError> {
        let form = [
            ("type", "express"),
            ("country", country),
            ("capabilities[card_payments][requested]", "true"),
            ("capabilities[transfers][requested]", "true"),
            ("settings[payouts][schedule][interval]", "manual"),
        ];
        let raw = self
            .send(country, self.client.post(self.url("/v1/accounts")).form(&form))
            .await?;
        let account = self.decode_account(country, raw)?;
        tracing::info!(
            service = %self.config.name,
            account = %account.id,
            country = %country,
            "Connected account created"
        );
        Ok(account)
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        redirect_url: &str,
    ) -> Result<AccountLink, SettlementError> {
        let form = [
            ("account", account_id),
            ("refresh_url", redirect_url),
            ("return_url", redirect_url),
            ("type", "account_onboarding"),
        ];
        let raw = self
            .send(account_id, self.client.post(self.url("/v1/account_links")).form(&form))
            .await?;
        let link: StripeAccountLink = self.decode(account_id, &raw)?;
        Ok(AccountLink {
            url: link.url,
            expires_at: link
                .expires_at
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            raw,
        })
    }

    async fn fetch_account(&self, account_id: &str) -> Result<ConnectedAccount, SettlementError> {
        let path = format!("/v1/accounts/{}", account_id);
        let raw = self.send(account_id, self.client.get(self.url(&path))).await?;
        self.decode_account(account_id, raw)
    }
}
