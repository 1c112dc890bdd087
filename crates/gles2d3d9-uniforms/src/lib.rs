//! GLSL ES uniform storage and D3D9 constant-register binding.
//!
//! A [`LinkedProgram`] owns one [`UniformDescriptor`] per active uniform. Linking sizes each
//! descriptor from its type, then packs the uniforms referenced by each stage into that stage's
//! `c#` (float4) and `s#` (sampler) register files. Application writes go through the
//! `glUniform*`-shaped API in [`api`] and only mark storage dirty; [`upload_dirty`] later expands
//! dirty storage into registers for every stage the uniform is bound in.
//!
//! Everything is synchronous and single-threaded per program; mutation requires `&mut`.

#![forbid(unsafe_code)]

pub mod alloc;
pub mod api;
pub mod limits;
pub mod program;
pub mod stage;
pub mod uniform;
pub mod upload;

pub use gles2d3d9_types::{Precision, RegisterFile, UniformType};

pub use crate::alloc::{RegisterUsage, ShaderUsage};
pub use crate::api::{UniformApiError, UniformLocation, UniformValue};
pub use crate::limits::{ConfigError, LinkConfig, RegisterLimits, ShaderModel};
pub use crate::program::{ActiveUniform, LinkError, LinkedProgram};
pub use crate::stage::{PerStage, ShaderStage, ShaderStageFlags};
pub use crate::uniform::{UniformDescriptor, UniformError};
pub use crate::upload::{
    upload_dirty, ConstantFile, ConstantSink, StageConstants, UploadError, UploadStats, Vec4,
};
