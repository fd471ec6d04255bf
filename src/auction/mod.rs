pub mod commands;
pub mod events;
pub mod model;
pub mod state;

pub use commands::{AuctionService, CreateAuctionCommand, EditAuctionCommand};
