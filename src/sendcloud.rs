//! Sendcloud shipping-label client
//!
//! Thin wrapper over the v2 parcels API: create a parcel (label +
//! tracking if the carrier supports it) and poll one by id. Non-success
//! responses surface as `Upstream` errors carrying status and body.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{OrderFlowError, Result};

const DEFAULT_BASE_URL: &str = "https://panel.sendcloud.sc/api/v2";

#[derive(Clone, Debug)]
pub struct SendcloudConfig {
    pub public_key: String,
    pub secret_key: String,
    pub shipping_method_id: i64,
    pub base_url: String,
}

impl SendcloudConfig {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>, shipping_method_id: i64) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            shipping_method_id,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CreateParcelRequest {
    pub order_number: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub weight_kg: Option<f64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ParcelResponse {
    pub parcel: Parcel,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Parcel {
    pub id: i64,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    /// Arrives as a bare string or `{id, message}`; coerced downstream.
    #[serde(default)]
    pub status: Value,
}

#[derive(Clone)]
pub struct SendcloudClient {
    http: reqwest::Client,
    config: SendcloudConfig,
}

impl SendcloudClient {
    pub fn new(config: SendcloudConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    pub fn shipping_method_id(&self) -> i64 {
        self.config.shipping_method_id
    }

    pub async fn create_parcel(&self, req: &CreateParcelRequest) -> Result<ParcelResponse> {
        // order_number is capped at 50 chars by the provider
        let order_number: String = req.order_number.chars().take(50).collect();
        let body = json!({
            "parcel": {
                "name": req.name,
                "company_name": "Solemend",
                "email": req.email,
                "telephone": req.phone.clone().unwrap_or_default(),
                "address": req.address,
                "postal_code": req.postal_code,
                "city": req.city,
                "country": req.country,
                "order_number": order_number,
                "shipment": { "id": self.config.shipping_method_id },
                // provider expects the weight as a string
                "weight": format!("{:.3}", req.weight_kg.unwrap_or(0.5)),
            }
        });

        let resp = self
            .http
            .post(format!("{}/parcels", self.config.base_url))
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&body)
            .send()
            .await?;

        Self::parse(resp).await
    }

    pub async fn get_parcel(&self, parcel_id: i64) -> Result<ParcelResponse> {
        let resp = self
            .http
            .get(format!("{}/parcels/{}", self.config.base_url, parcel_id))
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .send()
            .await?;

        Self::parse(resp).await
    }

    async fn parse(resp: reqwest::Response) -> Result<ParcelResponse> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OrderFlowError::Upstream { status: status.as_u16(), body });
        }
        Ok(resp.json().await?)
    }
}
