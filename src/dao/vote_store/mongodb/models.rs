use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{EstimationEntity, VoteEntity};

/// BSON document shape for a persisted vote record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    room_id: i64,
    started_at: DateTime,
    flipped_at: DateTime,
    estimations: Vec<EstimationEntity>,
}

impl From<VoteEntity> for MongoVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id as i64,
            started_at: DateTime::from_system_time(value.started_at),
            flipped_at: DateTime::from_system_time(value.flipped_at),
            estimations: value.estimations,
        }
    }
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
