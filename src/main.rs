//! Solemend Orders - checkout funnel and order lifecycle service

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solemend_orders::config::AppConfig;
use solemend_orders::domain::abandonment::{self, StagePolicy};
use solemend_orders::domain::history::ShippingUpdate;
use solemend_orders::domain::order::{OrderUpdate, StringList};
use solemend_orders::sendcloud::{CreateParcelRequest, SendcloudClient};
use solemend_orders::store::OrderStore;
use solemend_orders::webhook::{self, CheckoutSession, WebhookEvent};
use solemend_orders::OrderFlowError;

#[derive(Clone)]
pub struct AppState {
    /// The store is not internally synchronized; the mutex serializes its
    /// whole-collection read-modify-write cycles across handlers.
    pub store: Arc<Mutex<OrderStore>>,
    pub sendcloud: Option<SendcloudClient>,
    pub config: Arc<AppConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = AppConfig::from_env();
    let store = Arc::new(Mutex::new(OrderStore::new(&config.orders_path)));
    let sendcloud = config.sendcloud.clone().map(SendcloudClient::new);
    let state = AppState { store, sendcloud, config: Arc::new(config) };

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "solemend-orders"})) }))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/checkout/started", post(checkout_started))
        .route("/api/v1/stripe/webhook", get(webhook_alive).post(stripe_webhook))
        .route("/api/v1/sendcloud/refresh", post(sendcloud_refresh))
        .route("/api/v1/abandoned/run", get(abandoned_run_cron).post(abandoned_run_manual))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state.clone());

    let port = state.config.port.clone();
    tracing::info!("🚀 Solemend orders listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

fn error_response(err: OrderFlowError) -> (StatusCode, String) {
    let status = match &err {
        OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderFlowError::Precondition(_) => StatusCode::BAD_REQUEST,
        OrderFlowError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

async fn list_orders(State(s): State<AppState>) -> Json<Value> {
    let store = s.store.lock().await;
    Json(json!({"orders": store.list()}))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, String)> {
    let store = s.store.lock().await;
    store.get(&id).map(|o| Json(json!({"order": o}))).ok_or((StatusCode::NOT_FOUND, "Order not found".to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutStartedRequest {
    pub id: String,
    pub checkout_url: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub mode: Option<String>,
    pub shoe_type: Option<String>,
    pub services: Option<StringList>,
    pub upgrades: Option<StringList>,
    pub delivery: Option<String>,
}

/// Checkout-session creation trigger: persist the unpaid stub immediately
/// so abandonment tracking works even if the payment never completes.
async fn checkout_started(State(s): State<AppState>, Json(req): Json<CheckoutStartedRequest>) -> Result<Json<Value>, (StatusCode, String)> {
    if req.id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing session id".to_string()));
    }

    let update = OrderUpdate {
        created_at: Some(Utc::now()),
        customer_email: req.email.clone(),
        email: req.email,
        name: req.full_name,
        phone: req.phone,
        mode: req.mode,
        payment_status: Some("unpaid".to_string()),
        shoe_type: req.shoe_type,
        services: req.services,
        upgrades: req.upgrades,
        delivery: Some(req.delivery.unwrap_or_else(|| "postal".to_string())),
        checkout_url: req.checkout_url,
        ..OrderUpdate::new(req.id)
    };

    let store = s.store.lock().await;
    let order = store.upsert(update).map_err(error_response)?;
    Ok(Json(json!({"ok": true, "order": order})))
}

async fn webhook_alive() -> &'static str {
    "Webhook endpoint alive"
}

/// Payment-provider webhook. Signature is always verified; processing
/// failures are logged but the event is still acknowledged so the
/// provider does not retry forever.
async fn stripe_webhook(State(s): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<Value>, (StatusCode, String)> {
    let Some(secret) = s.config.stripe_webhook_secret.as_deref() else {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Missing STRIPE_WEBHOOK_SECRET".to_string()));
    };
    let Some(signature) = headers.get("stripe-signature").and_then(|v| v.to_str().ok()) else {
        return Err((StatusCode::BAD_REQUEST, "Missing stripe-signature".to_string()));
    };
    if !webhook::verify_signature(body.as_bytes(), signature, secret) {
        return Err((StatusCode::BAD_REQUEST, "Signature verification failed".to_string()));
    }

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Malformed event: {e}")))?;

    match event.kind.as_str() {
        "checkout.session.completed" => {
            if let Err(err) = handle_checkout_completed(&s, event.data.object).await {
                tracing::error!("webhook handler error: {}", err);
            }
        }
        _ => {}
    }

    Ok(Json(json!({"received": true})))
}

async fn handle_checkout_completed(s: &AppState, session: CheckoutSession) -> solemend_orders::Result<()> {
    let update = OrderUpdate {
        created_at: Some(Utc::now()),
        customer_email: session.email(),
        email: session.email(),
        name: session.name(),
        phone: session.phone(),
        mode: session.mode.clone(),
        payment_status: session.payment_status.clone(),
        shoe_type: session.meta("shoeType"),
        services: session.meta("services").map(StringList::Text),
        upgrades: session.meta("upgrades").map(StringList::Text),
        delivery: session.meta("delivery"),
        amount_total: session.amount_total,
        currency: session.currency.clone(),
        stripe_customer_id: session.customer.clone(),
        stripe_subscription_id: session.subscription.clone(),
        checkout_url: session.url.clone(),
        ..OrderUpdate::new(session.id.clone())
    };

    let saved = {
        let store = s.store.lock().await;
        store.upsert(update)?
    };

    // Postal orders get a shipping label straight away
    let delivery = session.meta("delivery").unwrap_or_default().to_lowercase();
    if delivery == "postal" {
        let client = s.sendcloud.as_ref().ok_or_else(|| {
            OrderFlowError::Precondition("Shipping provider not configured".to_string())
        })?;
        if client.shipping_method_id() == 0 {
            return Err(OrderFlowError::Precondition("Missing SENDCLOUD_SHIPPING_METHOD_ID".to_string()));
        }

        let address = session.meta("addressLine1");
        let city = session.meta("city");
        let postcode = session.meta("postcode");
        let (Some(address), Some(city), Some(postcode)) = (address, city, postcode) else {
            return Err(OrderFlowError::Precondition(
                "Missing addressLine1/city/postcode in session metadata".to_string(),
            ));
        };

        let order_number = saved.short_ref.clone().unwrap_or_else(|| {
            format!("SM-{}", session.id.trim_start_matches("cs_").chars().take(44).collect::<String>())
        });

        let parcel = client
            .create_parcel(&CreateParcelRequest {
                order_number,
                name: session.name().or_else(|| session.meta("fullName")).unwrap_or_else(|| "Customer".to_string()),
                email: session.email().unwrap_or_else(|| "unknown@example.com".to_string()),
                phone: session.phone(),
                address,
                city,
                postal_code: postcode,
                country: session.meta("country").unwrap_or_else(|| "GB".to_string()),
                weight_kg: Some(0.5),
            })
            .await?
            .parcel;

        let status = (!parcel.status.is_null()).then(|| parcel.status.clone());
        let store = s.store.lock().await;
        store.record_shipping_update(
            &session.id,
            &ShippingUpdate {
                parcel_id: Some(parcel.id),
                tracking_number: parcel.tracking_number.clone(),
                tracking_url: parcel.tracking_url.clone(),
                status,
            },
        )?;

        tracing::info!("sendcloud parcel created: {}", parcel.id);
    }

    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    pub order_id: String,
}

/// On-demand shipping status poll for one order.
async fn sendcloud_refresh(State(s): State<AppState>, Json(req): Json<RefreshRequest>) -> Result<Json<Value>, (StatusCode, String)> {
    if req.order_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing orderId".to_string()));
    }

    let parcel_id = {
        let store = s.store.lock().await;
        let existing = store
            .get(&req.order_id)
            .ok_or_else(|| error_response(OrderFlowError::OrderNotFound(req.order_id.clone())))?;
        existing
            .shipping_label_id
            .filter(|id| *id != 0)
            .ok_or_else(|| error_response(OrderFlowError::Precondition("No shipping label for this order".to_string())))?
    };

    let client = s
        .sendcloud
        .as_ref()
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Shipping provider not configured".to_string()))?;
    let parcel = client.get_parcel(parcel_id).await.map_err(error_response)?.parcel;

    let status = (!parcel.status.is_null()).then(|| parcel.status.clone());
    let store = s.store.lock().await;
    let updated = store
        .record_shipping_update(
            &req.order_id,
            &ShippingUpdate {
                parcel_id: Some(parcel.id),
                tracking_number: parcel.tracking_number.clone(),
                tracking_url: parcel.tracking_url.clone(),
                status,
            },
        )
        .map_err(error_response)?;

    Ok(Json(json!({"ok": true, "order": updated})))
}

/// Pre-shared token check for the abandonment trigger. The scheduler sends
/// `Authorization: Bearer <secret>`; a header or query fallback helps
/// manual invocation. No configured secret allows all callers.
fn cron_authorized(headers: &HeaderMap, query: &HashMap<String, String>, secret: Option<&str>) -> bool {
    let Some(secret) = secret else { return true };

    let bearer = format!("Bearer {secret}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(bearer.as_str()) {
        return true;
    }
    if headers.get("x-cron-secret").and_then(|v| v.to_str().ok()) == Some(secret) {
        return true;
    }
    query.get("secret").map(String::as_str) == Some(secret)
}

async fn abandoned_run_cron(State(s): State<AppState>, headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Result<Json<Value>, (StatusCode, String)> {
    if !cron_authorized(&headers, &query, s.config.cron_secret.as_deref()) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
    }
    run_abandoned(&s, s.config.stage_policy, "cron-get").await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOverrides {
    pub stage1_min: Option<i64>,
    pub stage2_min: Option<i64>,
    pub stage3_min: Option<i64>,
    pub max_advances: Option<usize>,
}

async fn abandoned_run_manual(State(s): State<AppState>, headers: HeaderMap, Query(query): Query<HashMap<String, String>>, body: Option<Json<RunOverrides>>) -> Result<Json<Value>, (StatusCode, String)> {
    if !cron_authorized(&headers, &query, s.config.cron_secret.as_deref()) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
    }

    let overrides = body.map(|Json(b)| b).unwrap_or_default();
    let defaults = s.config.stage_policy;
    let policy = StagePolicy {
        stage1_min: overrides.stage1_min.unwrap_or(defaults.stage1_min),
        stage2_min: overrides.stage2_min.unwrap_or(defaults.stage2_min),
        stage3_min: overrides.stage3_min.unwrap_or(defaults.stage3_min),
        max_advances_per_run: overrides.max_advances.unwrap_or(defaults.max_advances_per_run),
    };
    run_abandoned(&s, policy, "manual-post").await
}

async fn run_abandoned(s: &AppState, policy: StagePolicy, source: &str) -> Result<Json<Value>, (StatusCode, String)> {
    let store = s.store.lock().await;
    let processed = abandonment::run_once(&store, &policy, Utc::now()).map_err(error_response)?;

    Ok(Json(json!({
        "ok": true,
        "stage1Min": policy.stage1_min,
        "stage2Min": policy.stage2_min,
        "stage3Min": policy.stage3_min,
        "processed": processed.len(),
        "results": processed,
        "source": source,
    })))
}
