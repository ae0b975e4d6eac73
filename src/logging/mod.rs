pub mod auction_log;
pub mod writer;
