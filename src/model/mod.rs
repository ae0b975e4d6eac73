pub mod adapters;
pub mod bid;
pub mod bidder;
pub mod context;
pub mod currency;
pub mod deals;
pub mod request;
pub mod slot;
