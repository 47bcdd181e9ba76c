//! Notification Sink Trait
//!
//! Fire-and-forget messages about trade activity. Implementations must not
//! block the trade loop on delivery and must swallow their own errors; a
//! dropped notification is acceptable, a stalled cycle is not.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}
