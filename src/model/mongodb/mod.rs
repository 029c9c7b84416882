mod collection;
mod counter;
mod errors;

use mongodb::bson::{doc, Document};

pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub(crate) use collection::{CANDIDATES, ELECTIONS, VOTERS, VOTES};
pub use counter::Counter;
pub use errors::{is_duplicate_key_error, DUPLICATE_KEY};

/// Create a filter matching the document with the given numeric `_id`.
pub fn id_filter(id: u32) -> Document {
    doc! { "_id": id }
}
