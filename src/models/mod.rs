pub mod auth;
pub mod common;
pub mod history;
pub mod image;

pub use auth::*;
pub use common::*;
pub use history::*;
pub use image::*;
