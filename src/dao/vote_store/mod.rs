#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::VoteEntity;
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence sink that records flipped votes.
///
/// The engine never reads votes back; recording is a one-way side effect of a
/// successful flip, so the contract stays intentionally small.
pub trait VoteStore: Send + Sync {
    fn record_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
