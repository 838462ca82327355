pub mod api;
pub mod client;
pub mod model;

pub use api::WorkApi;
pub use client::HttpWorkClient;
pub use model::*;
