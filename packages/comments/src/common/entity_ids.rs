//! Typed ID definitions for the storage entities.

pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Post entities.
pub struct Post;

/// Marker type for Comment entities.
pub struct Comment;

/// Marker type for live comment subscriptions.
pub struct Subscription;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Post entities.
pub type PostId = Id<Post>;

/// Typed ID for Comment entities.
pub type CommentId = Id<Comment>;

/// Typed ID for a subscriber registration. Never persisted, so random.
pub type SubscriptionId = Id<Subscription, V4>;
