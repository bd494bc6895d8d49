//! Local stand-ins for the card processor, the EVM explorer and the Cardano
//! indexer, plus a configuration pointing every rail at them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use paysettle_core::config::{
    ChainConfig, ChainKind, ConfirmationConfig, FiatServiceConfig, FiatServiceKind,
    LoggingConfig, NetworkMode, TokenConfig,
};
use paysettle_core::SettlementConfig;
use serde_json::{json, Value};

pub const STRIPE: &str = "stripe";
pub const USDC: &str = "0xA0b8USDC";
pub const MERCHANT_WALLET: &str = "0xMerchant";
pub const ADA: &str = "lovelace";
/// Customer whose card always asks for step-up authentication.
pub const STEP_UP_CUSTOMER: &str = "cus_3ds";

/// Route test logs through the libtest capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake server");
    });
    format!("http://{}", addr)
}

// =========================================================================
// Card processor
// =========================================================================

/// Stateful fake of the card processor: payment intents, customers with
/// their cards, and connected accounts.
#[derive(Default)]
pub struct FakeProcessor {
    intents: Mutex<HashMap<String, Value>>,
    forms: Mutex<Vec<HashMap<String, String>>>,
    directory: Mutex<Directory>,
}

#[derive(Default)]
struct Directory {
    next_id: u32,
    /// Attached card ids per customer, oldest first.
    cards: HashMap<String, Vec<String>>,
    default_cards: HashMap<String, String>,
    accounts: HashMap<String, Value>,
}

impl Directory {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

impl FakeProcessor {
    pub async fn start() -> (Arc<Self>, String) {
        let processor = Arc::new(Self::default());
        let router = Router::new()
            .route("/v1/payment_methods", get(payment_methods).post(create_payment_method))
            .route("/v1/payment_methods/{id}/attach", post(attach_payment_method))
            .route("/v1/payment_methods/{id}/detach", post(detach_payment_method))
            .route("/v1/customers", post(create_customer))
            .route("/v1/customers/{id}", post(update_customer))
            .route("/v1/accounts", post(create_account))
            .route("/v1/accounts/{id}", get(retrieve_account))
            .route("/v1/account_links", post(create_account_link))
            .route("/v1/payment_intents", post(create_intent))
            .route("/v1/payment_intents/{id}", get(retrieve_intent))
            .with_state(processor.clone());
        let base = serve(router).await;
        (processor, base)
    }

    /// Form bodies of every intent created so far.
    pub fn forms(&self) -> Vec<HashMap<String, String>> {
        self.forms.lock().unwrap().clone()
    }

    /// Simulate the customer finishing step-up authentication.
    pub fn complete_step_up(&self, intent_id: &str) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent["status"] = json!("succeeded");
        }
    }

    /// The default card recorded for `customer`, if any.
    pub fn default_card(&self, customer: &str) -> Option<String> {
        self.directory.lock().unwrap().default_cards.get(customer).cloned()
    }
}

/// Customers created through the API list their attached cards; any other
/// customer id has a single card `pm_<customer>` on file.
async fn payment_methods(
    State(processor): State<Arc<FakeProcessor>>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let customer = q.get("customer").cloned().unwrap_or_default();
    let directory = processor.directory.lock().unwrap();
    let data: Vec<Value> = match directory.cards.get(&customer) {
        Some(cards) => cards
            .iter()
            .map(|id| json!({ "id": id, "customer": customer, "card": { "brand": "visa", "last4": "4242" } }))
            .collect(),
        None => vec![json!({ "id": format!("pm_{}", customer) })],
    };
    Json(json!({ "data": data }))
}

async fn create_payment_method(
    State(processor): State<Arc<FakeProcessor>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    assert_eq!(form.get("type").map(String::as_str), Some("card"));
    let id = processor.directory.lock().unwrap().next("pm");
    Json(json!({ "id": id, "customer": null, "card": { "brand": "visa", "last4": "4242" } }))
}

async fn attach_payment_method(
    State(processor): State<Arc<FakeProcessor>>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let customer = form["customer"].clone();
    processor
        .directory
        .lock()
        .unwrap()
        .cards
        .entry(customer.clone())
        .or_default()
        .push(id.clone());
    Json(json!({ "id": id, "customer": customer, "card": { "brand": "visa", "last4": "4242" } }))
}

async fn detach_payment_method(
    State(processor): State<Arc<FakeProcessor>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut directory = processor.directory.lock().unwrap();
    let mut found = false;
    for cards in directory.cards.values_mut() {
        let before = cards.len();
        cards.retain(|card| card != &id);
        found |= cards.len() != before;
    }
    if !found {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "message": format!("No such PaymentMethod: {}", id) } })),
        );
    }
    (StatusCode::OK, Json(json!({ "id": id, "customer": null })))
}

async fn create_customer(
    State(processor): State<Arc<FakeProcessor>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let mut directory = processor.directory.lock().unwrap();
    let id = directory.next("cus");
    directory.cards.insert(id.clone(), Vec::new());
    Json(json!({ "id": id, "object": "customer", "email": form.get("email") }))
}

async fn update_customer(
    State(processor): State<Arc<FakeProcessor>>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    if let Some(card) = form.get("invoice_settings[default_payment_method]") {
        processor
            .directory
            .lock()
            .unwrap()
            .default_cards
            .insert(id.clone(), card.clone());
    }
    Json(json!({ "id": id, "object": "customer" }))
}

async fn create_account(
    State(processor): State<Arc<FakeProcessor>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let mut directory = processor.directory.lock().unwrap();
    let id = directory.next("acct");
    let account = json!({
        "id": id,
        "type": form.get("type"),
        "country": form.get("country"),
        "charges_enabled": false,
        "payouts_enabled": false,
        "details_submitted": false,
    });
    directory.accounts.insert(id, account.clone());
    Json(account)
}

async fn retrieve_account(
    State(processor): State<Arc<FakeProcessor>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match processor.directory.lock().unwrap().accounts.get(&id) {
        Some(account) => (StatusCode::OK, Json(account.clone())),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "message": format!("No such account: {}", id) } })),
        ),
    }
}

async fn create_account_link(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "object": "account_link",
        "url": format!("https://connect.example/setup/{}", form["account"]),
        "expires_at": 1_700_000_300,
    }))
}

async fn create_intent(
    State(processor): State<Arc<FakeProcessor>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let mut intents = processor.intents.lock().unwrap();
    let id = format!("pi_{}", intents.len() + 1);
    let status = if form.get("customer").map(String::as_str) == Some(STEP_UP_CUSTOMER) {
        "requires_action"
    } else {
        "succeeded"
    };
    let intent = json!({
        "id": id,
        "object": "payment_intent",
        "amount": form["amount"].parse::<i64>().unwrap_or_default(),
        "currency": form["currency"],
        "status": status,
        "client_secret": format!("{}_secret_fake", id),
    });
    intents.insert(id, intent.clone());
    processor.forms.lock().unwrap().push(form);
    Json(intent)
}

async fn retrieve_intent(
    State(processor): State<Arc<FakeProcessor>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match processor.intents.lock().unwrap().get(&id) {
        Some(intent) => (StatusCode::OK, Json(intent.clone())),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "message": format!("No such payment_intent: {}", id) } })),
        ),
    }
}

// =========================================================================
// EVM explorer
// =========================================================================

/// Etherscan-style explorer serving whatever token transfers it was given.
#[derive(Default)]
pub struct FakeExplorer {
    rows: Mutex<Vec<Value>>,
}

impl FakeExplorer {
    pub async fn start() -> (Arc<Self>, String) {
        let explorer = Arc::new(Self::default());
        let router = Router::new()
            .route("/api", get(token_transfers))
            .with_state(explorer.clone());
        let base = serve(router).await;
        (explorer, base)
    }

    /// Publish a USDC transfer of `value` base units to the merchant wallet.
    pub fn push_transfer(&self, hash: &str, value: &str, confirmations: u64) {
        self.rows.lock().unwrap().push(json!({
            "blockNumber": "5000",
            "timeStamp": "1700000000",
            "hash": hash,
            "from": "0xPayer",
            "to": MERCHANT_WALLET,
            "contractAddress": USDC.to_lowercase(),
            "value": value,
            "tokenSymbol": "USDC",
            "tokenDecimal": "6",
            "confirmations": confirmations.to_string(),
        }));
    }
}

async fn token_transfers(
    State(explorer): State<Arc<FakeExplorer>>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    assert_eq!(q.get("action").map(String::as_str), Some("tokentx"));
    let rows = explorer.rows.lock().unwrap().clone();
    if rows.is_empty() {
        return Json(json!({ "status": "0", "message": "No transactions found", "result": [] }));
    }
    Json(json!({ "status": "1", "message": "OK", "result": rows }))
}

// =========================================================================
// Cardano indexer
// =========================================================================

/// Blockfrost-style indexer knowing one transaction, `ada_tx`, that pays
/// 25 ADA to the merchant and returns change to the sender.
pub async fn start_blockfrost() -> String {
    let router = Router::new()
        .route("/api/v0/txs/{hash}", get(cardano_tx))
        .route("/api/v0/txs/{hash}/utxos", get(cardano_utxos))
        .route(
            "/api/v0/blocks/{block}",
            get(|Path(block): Path<String>| async move {
                Json(json!({ "hash": block, "height": 42, "time": 1_700_000_500 }))
            }),
        );
    serve(router).await
}

async fn cardano_tx(Path(hash): Path<String>) -> (StatusCode, Json<Value>) {
    if hash != "ada_tx" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status_code": 404, "message": "The requested component has not been found." })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "hash": hash, "block": "blk42", "block_time": 1_700_000_500 })),
    )
}

async fn cardano_utxos(Path(hash): Path<String>) -> Json<Value> {
    Json(json!({
        "hash": hash,
        "inputs": [
            { "address": "addr1payer", "amount": [{ "unit": "lovelace", "quantity": "30000000" }] }
        ],
        "outputs": [
            { "address": "addr1merchant", "amount": [{ "unit": "lovelace", "quantity": "25000000" }] },
            { "address": "addr1payer", "amount": [{ "unit": "lovelace", "quantity": "4800000" }] }
        ]
    }))
}

// =========================================================================
// Configuration
// =========================================================================

/// Settlement configuration pointing every rail at the local fakes.
pub fn settlement_config(stripe: &str, explorer: &str, blockfrost: &str) -> SettlementConfig {
    SettlementConfig {
        fiat: vec![FiatServiceConfig {
            name: STRIPE.into(),
            kind: FiatServiceKind::Stripe,
            api_key: "sk_test_integration".into(),
            base_url: stripe.into(),
            callback_url: Some("https://shop.example/return".into()),
            timeout_secs: 5,
        }],
        chains: vec![
            ChainConfig {
                name: "sepolia".into(),
                kind: ChainKind::Evm,
                mode: NetworkMode::Testnet,
                explorer: format!("{}/api", explorer),
                contract_address: MERCHANT_WALLET.into(),
                api_key: "explorer-key".into(),
                tokens: vec![TokenConfig {
                    name: "USD Coin".into(),
                    symbol: "USDC".into(),
                    address: USDC.into(),
                    decimals: 6,
                }],
                timeout_secs: 5,
            },
            ChainConfig {
                name: "cardano".into(),
                kind: ChainKind::Cardano,
                mode: NetworkMode::Mainnet,
                explorer: format!("{}/api/v0", blockfrost),
                contract_address: String::new(),
                api_key: "project-key".into(),
                tokens: vec![TokenConfig {
                    name: "Ada".into(),
                    symbol: "ADA".into(),
                    address: ADA.into(),
                    decimals: 6,
                }],
                timeout_secs: 5,
            },
        ],
        confirmation: ConfirmationConfig {
            min_depth: 10,
            max_attempts: 5,
            interval_ms: 20,
            deadline_secs: 5,
        },
        logging: LoggingConfig::default(),
    }
}
