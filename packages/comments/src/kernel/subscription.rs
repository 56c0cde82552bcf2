//! Bridges a backend comment subscription to one API consumer.
//!
//! The forwarding task copies comments from the backend channel into a
//! single-slot output stream as [`CommentData`], and stops at whichever comes
//! first: the consumer's cancellation token fires, the consumer drops the
//! stream, or the backend closes its side. On the way out it always releases
//! the backend registration (transient store: channel entry removed; durable
//! store: listener connection closed).
//!
//! # Usage
//!
//! ```rust,ignore
//! // In a GraphQL subscription resolver
//! let cancel = CancellationToken::new();
//! let stream = subscribe_comments(storage.clone(), post_id, cancel.child_token()).await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::StorageResult;
use super::traits::{BaseStorage, CommentSubscription, SUBSCRIBER_CAPACITY};
use crate::common::PostId;
use crate::domains::posts::CommentData;

/// Subscribe to a post's comments and bridge the result to the caller.
pub async fn subscribe_comments(
    storage: Arc<dyn BaseStorage>,
    post_id: PostId,
    cancel: CancellationToken,
) -> StorageResult<ReceiverStream<CommentData>> {
    let subscription = storage.subscribe_to_comments(post_id).await?;
    Ok(bridge(storage, subscription, cancel))
}

/// Spawn the forwarding task for an existing subscription.
pub fn bridge(
    storage: Arc<dyn BaseStorage>,
    subscription: CommentSubscription,
    cancel: CancellationToken,
) -> ReceiverStream<CommentData> {
    let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
    tokio::spawn(forward(storage, subscription, cancel, sender));
    ReceiverStream::new(receiver)
}

async fn forward(
    storage: Arc<dyn BaseStorage>,
    mut subscription: CommentSubscription,
    cancel: CancellationToken,
    sender: mpsc::Sender<CommentData>,
) {
    let handle = subscription.handle.clone();

    loop {
        let comment = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(post_id = %handle.post_id, subscription_id = %handle.id, "subscription cancelled");
                break;
            }
            _ = sender.closed() => {
                debug!(post_id = %handle.post_id, subscription_id = %handle.id, "consumer went away");
                break;
            }
            next = subscription.next_comment() => match next {
                Ok(comment) => comment,
                Err(e) => {
                    debug!(post_id = %handle.post_id, subscription_id = %handle.id, reason = %e, "backend stream ended");
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sender.send(CommentData::from(comment)) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    storage.unsubscribe(&handle).await;
}
