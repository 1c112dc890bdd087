//! GLES-on-D3D9 uniform handling.
//!
//! Re-exports the workspace crates under one name:
//!
//! - [`types`]: closed GLSL ES uniform type tables.
//! - [`uniforms`]: descriptors, register allocation, the `glUniform*` API and constant upload.

#![forbid(unsafe_code)]

pub use gles2d3d9_types as types;
pub use gles2d3d9_uniforms as uniforms;
