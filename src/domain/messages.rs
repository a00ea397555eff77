//! Abandoned-checkout follow-up payloads
//!
//! Builders only; dispatch is an external collaborator and currently a
//! log-only sink in the run handler.

use serde::Serialize;

use super::order::OrderRecord;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StageMessage {
    Stage1 { whatsapp: String, email: EmailMessage },
    Stage2 { sms: String },
    Stage3 { r#final: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

pub fn for_stage(stage: u8, order: &OrderRecord) -> Option<StageMessage> {
    match stage {
        1 => Some(build_stage1(order)),
        2 => Some(build_stage2(order)),
        3 => Some(build_stage3(order)),
        _ => None,
    }
}

fn name_or(order: &OrderRecord, fallback: &str) -> String {
    order.name.clone().filter(|n| !n.is_empty()).unwrap_or_else(|| fallback.to_string())
}

fn shoe_type(order: &OrderRecord) -> String {
    order.shoe_type.clone().unwrap_or_else(|| "shoes".to_string())
}

fn services_line(order: &OrderRecord) -> String {
    if order.services.is_empty() {
        "services".to_string()
    } else {
        order.services.join(", ")
    }
}

fn checkout_url(order: &OrderRecord) -> String {
    order.checkout_url.clone().unwrap_or_default()
}

pub fn build_stage1(order: &OrderRecord) -> StageMessage {
    StageMessage::Stage1 {
        whatsapp: format!(
            "Hi {} 👋\nYou were just checking out Solemend for your {}.\n\nYou selected: {}.\n\nFinish your booking here:\n{}\n\nNeed help? Just reply 👍",
            name_or(order, "there"),
            shoe_type(order),
            services_line(order),
            checkout_url(order),
        ),
        email: EmailMessage {
            subject: "Your Solemend quote is ready 👟".to_string(),
            body: format!(
                "Hi {},\n\nYou were almost done booking your shoe restoration.\n\nShoe: {}\nServices: {}\n\nComplete your booking here:\n{}\n\nAny questions — just reply to this email.",
                name_or(order, ""),
                shoe_type(order),
                if order.services.is_empty() { "—".to_string() } else { order.services.join(", ") },
                checkout_url(order),
            ),
        },
    }
}

pub fn build_stage2(order: &OrderRecord) -> StageMessage {
    StageMessage::Stage2 {
        sms: format!(
            "Solemend reminder 👟\nYour shoe restoration quote is still open.\n\nFinish booking:\n{}",
            checkout_url(order),
        ),
    }
}

pub fn build_stage3(order: &OrderRecord) -> StageMessage {
    StageMessage::Stage3 {
        r#final: format!(
            "Last reminder from Solemend 👟\nYour quote ({}) will expire soon.\n\nComplete here:\n{}",
            order.short_ref.clone().unwrap_or_default(),
            checkout_url(order),
        ),
    }
}
