use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use super::Coll;

/// A counter object used to implement auto-increment fields.
///
/// Each collection with numeric IDs has one counter, keyed by the collection
/// name. The first value handed out is 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    /// The most recently issued value.
    pub value: u32,
}

impl Counter {
    /// Atomically retrieve the next value of the counter with the given ID,
    /// creating the counter if it doesn't exist yet.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32, DbError> {
        let update = doc! {
            "$inc": { "value": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?;
        // With `upsert` and `ReturnDocument::After` the server always returns a document.
        Ok(counter.map(|c| c.value).unwrap_or(1))
    }
}
