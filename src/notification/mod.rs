pub mod fanout;
pub mod model;

pub use fanout::{NotificationContent, NotificationService};
