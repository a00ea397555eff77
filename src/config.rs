//! Environment-backed configuration

use std::env;
use std::path::PathBuf;

use crate::domain::abandonment::StagePolicy;
use crate::sendcloud::SendcloudConfig;

const DEFAULT_PORT: &str = "8083";
const DEFAULT_ORDERS_PATH: &str = "data/orders.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: String,
    pub orders_path: PathBuf,
    /// Pre-shared token for the abandonment run trigger. Unset allows all
    /// callers (dev convenience).
    pub cron_secret: Option<String>,
    /// Webhook signing secret. Unset makes the webhook endpoint refuse
    /// events rather than skip verification.
    pub stripe_webhook_secret: Option<String>,
    pub stage_policy: StagePolicy,
    pub sendcloud: Option<SendcloudConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = StagePolicy::default();
        let stage_policy = StagePolicy {
            stage1_min: env_i64("ABANDONED_STAGE1_MIN", defaults.stage1_min),
            stage2_min: env_i64("ABANDONED_STAGE2_MIN", defaults.stage2_min),
            stage3_min: env_i64("ABANDONED_STAGE3_MIN", defaults.stage3_min),
            max_advances_per_run: env_i64("ABANDONED_MAX_ADVANCES", defaults.max_advances_per_run as i64)
                .max(0) as usize,
        };

        let sendcloud = match (
            env::var("SENDCLOUD_PUBLIC_KEY").ok().filter(|v| !v.is_empty()),
            env::var("SENDCLOUD_SECRET_KEY").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(public_key), Some(secret_key)) => {
                let mut cfg = SendcloudConfig::new(
                    public_key,
                    secret_key,
                    env_i64("SENDCLOUD_SHIPPING_METHOD_ID", 0),
                );
                if let Ok(base_url) = env::var("SENDCLOUD_BASE_URL") {
                    cfg.base_url = base_url;
                }
                Some(cfg)
            }
            _ => None,
        };

        Self {
            port: env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string()),
            orders_path: env::var("ORDERS_PATH")
                .unwrap_or_else(|_| DEFAULT_ORDERS_PATH.to_string())
                .into(),
            cron_secret: env::var("CRON_SECRET").ok().filter(|v| !v.is_empty()),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok().filter(|v| !v.is_empty()),
            stage_policy,
            sendcloud,
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
