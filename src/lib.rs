pub mod app;
pub mod auction;
pub mod bidding;
pub mod channel;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod message_broker;
pub mod notification;
pub mod principal;
pub mod scheduler;
pub mod store;
