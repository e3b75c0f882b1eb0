//! The Matrix room seam
//!
//! Everything the bridge ever asks of Matrix. Kept deliberately narrow so
//! the coordinator can be exercised in tests with a recording mock instead
//! of a homeserver.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound operations on the bridged room
#[async_trait]
pub trait MatrixRoom: Send + Sync {
    /// Post a message, optionally reply-threaded, returning its event id
    async fn post_message(
        &self,
        plain: &str,
        html: &str,
        in_reply_to: Option<&str>,
    ) -> Result<String>;

    /// Replace the body of an earlier message
    async fn edit_message(&self, event_id: &str, plain: &str, html: &str) -> Result<()>;

    /// Best display name for a user: room nickname, then profile name, then
    /// the bare user id. Infallible by design; name lookup failures must not
    /// block message flow.
    async fn display_name(&self, user_id: &str) -> String;
}
