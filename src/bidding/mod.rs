pub mod commands;

pub use commands::{BidLedger, PlaceBidCommand};
