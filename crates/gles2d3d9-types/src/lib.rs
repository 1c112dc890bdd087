//! Closed type metadata for GLSL ES uniforms as they map onto D3D9-style register files.
//!
//! Everything here is a pure lookup keyed by [`UniformType`]. The enum is closed, so every
//! lookup is total; the only place an unknown type can appear is when decoding a raw GL enum
//! via [`UniformType::from_gl_enum`], which returns `None` and leaves the policy to the caller.

#![forbid(unsafe_code)]

mod precision;
mod uniform_type;

pub use crate::precision::Precision;
pub use crate::uniform_type::{
    byte_size_of, column_count_of, component_count_of, row_count_of, ComponentKind, RegisterFile,
    UniformType,
};
