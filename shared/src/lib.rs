pub mod messages;
pub mod models;

pub use messages::*;
pub use models::*;
