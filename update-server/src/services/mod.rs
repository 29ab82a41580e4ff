pub mod publisher;
pub mod release_store;
