mod handler;
mod model;

pub use handler::{get_location, set_location};
