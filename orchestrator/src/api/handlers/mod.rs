//! API request handlers

pub mod compose;
pub mod containers;
pub mod health;
pub mod images;
pub mod networks;
pub mod sessions;
pub mod volumes;
