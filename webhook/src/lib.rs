//! Signed webhook delivery.
//!
//! Confirmed records fan out to registered HTTP subscribers. Every payload
//! is signed with the webhook's secret, every delivery is persisted, and
//! failures retry on an exponential backoff up to the attempts cap.

mod dispatcher;
mod payload;
mod signature;
mod store;

pub use dispatcher::{DeliveryObserver, Dispatcher};
pub use payload::build_payload;
pub use signature::{
    ParsedSignature, SIGNATURE_HEADER, VerifyError, parse_header, sign, verify,
};
pub use store::{
    DeliveryStore, DeliveryUpdate, MemoryDeliveryStore, MemoryWebhookStore, StoreError,
    WebhookStore,
};
