pub mod events;
pub mod generation;
pub mod images;
pub mod models;
pub mod session;
