//! Domain logic: order records, merge normalisation, shipping status
//! history, short references and abandonment staging.

pub mod abandonment;
pub mod history;
pub mod messages;
pub mod normalize;
pub mod order;
pub mod reference;

pub use abandonment::{StageAdvance, StagePolicy};
pub use history::ShippingUpdate;
pub use order::{OrderRecord, OrderUpdate, PaymentMode, StatusHistoryEntry};
