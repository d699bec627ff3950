use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc, options::ClientOptions, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoVoteDocument, doc_id},
};
use crate::dao::{models::VoteEntity, storage::StorageResult, vote_store::VoteStore};

const VOTE_COLLECTION_NAME: &str = "votes";
const DEFAULT_DB: &str = "pointing_poker";

/// Connection settings for the MongoDB vote store.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}

/// MongoDB-backed vote sink.
#[derive(Clone)]
pub struct MongoVoteStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoVoteStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self
            .database()
            .await
            .collection::<mongodb::bson::Document>(VOTE_COLLECTION_NAME);
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"room_id": 1, "flipped_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("vote_room_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: VOTE_COLLECTION_NAME,
                index: "room_id,flipped_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection(&self) -> Collection<MongoVoteDocument> {
        self.database()
            .await
            .collection::<MongoVoteDocument>(VOTE_COLLECTION_NAME)
    }

    async fn insert_vote(&self, vote: VoteEntity) -> MongoResult<()> {
        let id = vote.id;
        let document: MongoVoteDocument = vote.into();
        let collection = self.collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::RecordVote { id, source })?;
        Ok(())
    }
}

impl VoteStore for MongoVoteStore {
    fn record_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_vote(vote).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
