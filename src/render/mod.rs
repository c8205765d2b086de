//! Render backend abstraction

pub mod backend;
pub mod headless;

pub use backend::{MaterialHandle, RenderBackend, TextureHandle, UniformValue};
pub use headless::HeadlessBackend;
