pub mod errors;
pub mod events;
pub mod image;
pub mod project;
pub mod styles;
