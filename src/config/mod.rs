//! Configuration consumed by the rendering pipeline
//!
//! - `loader`: the `Settings` structure and its YAML/JSON loading

pub mod loader;


pub use loader::Settings;
