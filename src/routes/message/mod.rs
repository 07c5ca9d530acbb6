mod handler;
mod model;

pub use handler::{create_message, nearby_messages};
