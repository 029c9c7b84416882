pub mod api;
pub mod db;
pub mod ids;
pub mod mongodb;
pub mod wallet;
