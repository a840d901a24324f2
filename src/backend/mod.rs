//! Backend abstraction layer
//!
//! Provides the traits and types that the wgpu backend and the recording
//! dummy backend implement.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::{Command, DummyBackend};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
