//! HTTP API handlers for soundmap-recorder

pub mod admin;
pub mod health;
pub mod recordings;
pub mod sound;
pub mod ui;

pub use admin::admin_routes;
pub use health::health_routes;
pub use recordings::recording_routes;
pub use sound::sound_routes;
pub use ui::{media_routes, ui_routes};
