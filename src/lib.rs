pub mod context;
pub mod docs;
pub mod enrich;
pub mod fetch;
pub mod fsutil;
pub mod html;
pub mod search;
pub mod store;
