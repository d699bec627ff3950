/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Vote recording sink and its backends.
pub mod vote_store;
