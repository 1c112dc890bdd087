//! Application-facing uniform access (`glGetUniformLocation`, `glUniform*`, `glGetUniform*`).

use std::borrow::Cow;

use gles2d3d9_types::{column_count_of, component_count_of, ComponentKind, UniformType};
use thiserror::Error;

use crate::program::LinkedProgram;
use crate::uniform::{UniformDescriptor, UniformError};

/// Opaque handle to one element of one uniform of a [`LinkedProgram`].
///
/// Only meaningful for the program that produced it; relinking invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    uniform: usize,
    element: usize,
}

impl UniformLocation {
    pub fn uniform_index(&self) -> usize {
        self.uniform
    }

    pub fn element(&self) -> usize {
        self.element
    }
}

/// Client-supplied uniform data, shaped like the `glUniform*` entry point it came from.
///
/// `values` may hold several elements back to back; the element count is
/// `values.len() / (components per element)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    /// `glUniform{1,2,3,4}f[v]`.
    Float { components: usize, values: &'a [f32] },
    /// `glUniform{1,2,3,4}i[v]`.
    Int { components: usize, values: &'a [i32] },
    /// `glUniformMatrix{2,3,4}fv`, column-major.
    Matrix { dimension: usize, values: &'a [f32] },
}

impl<'a> UniformValue<'a> {
    pub fn float(components: usize, values: &'a [f32]) -> Self {
        Self::Float { components, values }
    }

    pub fn int(components: usize, values: &'a [i32]) -> Self {
        Self::Int { components, values }
    }

    pub fn matrix(dimension: usize, values: &'a [f32]) -> Self {
        Self::Matrix { dimension, values }
    }

    /// `None` when a matrix dimension is too large to square.
    fn components_per_element(&self) -> Option<usize> {
        match *self {
            Self::Float { components, .. } | Self::Int { components, .. } => Some(components),
            Self::Matrix { dimension, .. } => dimension.checked_mul(dimension),
        }
    }

    fn len(&self) -> usize {
        match *self {
            Self::Float { values, .. } | Self::Matrix { values, .. } => values.len(),
            Self::Int { values, .. } => values.len(),
        }
    }

    /// GLSL spelling of one element of this value, used in diagnostics.
    pub fn shape(&self) -> &'static str {
        match *self {
            Self::Float { components, .. } => match components {
                1 => "float",
                2 => "vec2",
                3 => "vec3",
                4 => "vec4",
                _ => "float[invalid]",
            },
            Self::Int { components, .. } => match components {
                1 => "int",
                2 => "ivec2",
                3 => "ivec3",
                4 => "ivec4",
                _ => "int[invalid]",
            },
            Self::Matrix { dimension, .. } => match dimension {
                2 => "mat2",
                3 => "mat3",
                4 => "mat4",
                _ => "mat[invalid]",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformApiError {
    #[error("no active uniform named {0:?}")]
    UnknownUniform(String),
    #[error("uniform location {0:?} does not belong to this program")]
    UnknownLocation(UniformLocation),
    #[error("cannot set {expected} uniform {name:?} from {supplied} data")]
    TypeMismatch {
        name: String,
        expected: UniformType,
        supplied: &'static str,
    },
    #[error("sampler uniform {name:?} cannot use texture unit {unit}")]
    InvalidSamplerUnit { name: String, unit: i32 },
    #[error(transparent)]
    Range(#[from] UniformError),
}

/// Splits `name[3]` into (`name`, Some(3)). Malformed subscripts yield `None`.
fn split_subscript(name: &str) -> Option<(&str, Option<usize>)> {
    let Some(body) = name.strip_suffix(']') else {
        return Some((name, None));
    };
    let open = body.rfind('[')?;
    let index = body[open + 1..].parse::<usize>().ok()?;
    Some((&body[..open], Some(index)))
}

/// Checks `value` against the descriptor's type and converts it to the descriptor's storage
/// representation. Also returns how many elements the value covers.
fn encode_value<'v>(
    uniform: &UniformDescriptor,
    value: &UniformValue<'v>,
) -> Result<(Cow<'v, [u8]>, usize), UniformApiError> {
    let ty = uniform.ty();
    let mismatch = || UniformApiError::TypeMismatch {
        name: uniform.name().to_owned(),
        expected: ty,
        supplied: value.shape(),
    };

    let per_element = value
        .components_per_element()
        .filter(|&n| n == component_count_of(ty))
        .ok_or_else(mismatch)?;
    if value.len() % per_element != 0 {
        return Err(mismatch());
    }
    let count = value.len() / per_element;

    let bytes = match (ty.component_kind(), *value) {
        (ComponentKind::Float, UniformValue::Float { values, .. }) if !ty.is_matrix() => {
            Cow::Borrowed(bytemuck::cast_slice(values))
        }
        (ComponentKind::Float, UniformValue::Matrix { dimension, values })
            if ty.is_matrix() && dimension == column_count_of(ty) =>
        {
            Cow::Borrowed(bytemuck::cast_slice(values))
        }
        (ComponentKind::Int, UniformValue::Int { values, .. }) => {
            Cow::Borrowed(bytemuck::cast_slice(values))
        }
        (ComponentKind::Bool, UniformValue::Int { values, .. }) => {
            let bools: Vec<i32> = values.iter().map(|&v| i32::from(v != 0)).collect();
            Cow::Owned(bytemuck::cast_slice(&bools).to_vec())
        }
        (ComponentKind::Bool, UniformValue::Float { values, .. }) => {
            let bools: Vec<i32> = values.iter().map(|&v| i32::from(v != 0.0)).collect();
            Cow::Owned(bytemuck::cast_slice(&bools).to_vec())
        }
        (ComponentKind::Sampler, UniformValue::Int { values, .. }) => {
            if let Some(&unit) = values.iter().find(|&&unit| unit < 0) {
                return Err(UniformApiError::InvalidSamplerUnit {
                    name: uniform.name().to_owned(),
                    unit,
                });
            }
            Cow::Borrowed(bytemuck::cast_slice(values))
        }
        _ => return Err(mismatch()),
    };
    Ok((bytes, count))
}

impl LinkedProgram {
    /// Resolves `name` or `name[i]` to a location.
    ///
    /// Follows `glGetUniformLocation`: `name` and `name[0]` both address the first element of
    /// an array, subscripts past the end or on non-array uniforms resolve to nothing.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        let (base, subscript) = split_subscript(name)?;
        let uniform = *self.by_name.get(base)?;
        let descriptor = &self.uniforms[uniform];

        let element = match subscript {
            None => 0,
            Some(i) if descriptor.is_array() && i < descriptor.element_count() => i,
            Some(_) => return None,
        };
        Some(UniformLocation { uniform, element })
    }

    pub fn set_uniform(
        &mut self,
        name: &str,
        value: UniformValue<'_>,
    ) -> Result<(), UniformApiError> {
        let location = self
            .uniform_location(name)
            .ok_or_else(|| UniformApiError::UnknownUniform(name.to_owned()))?;
        self.set_uniform_at(location, value)
    }

    /// Writes `value` starting at `location`'s element.
    ///
    /// The whole call is rejected (and the uniform left untouched) if the value's shape does
    /// not match or if it runs past the end of the array.
    pub fn set_uniform_at(
        &mut self,
        location: UniformLocation,
        value: UniformValue<'_>,
    ) -> Result<(), UniformApiError> {
        let uniform = self
            .uniforms
            .get_mut(location.uniform)
            .ok_or(UniformApiError::UnknownLocation(location))?;

        let (bytes, count) = encode_value(uniform, &value)?;
        uniform.set_value(&bytes, location.element, count)?;
        Ok(())
    }

    /// Current raw storage of the uniform named `name` (all elements).
    pub fn uniform_value(&self, name: &str) -> Option<&[u8]> {
        self.uniform(name).map(UniformDescriptor::data)
    }

    /// `glGetUniformfv`: one element, with integer and boolean components converted to float.
    pub fn uniform_f32(&self, location: UniformLocation) -> Result<Vec<f32>, UniformApiError> {
        let (uniform, bytes) = self.element_at(location)?;
        let words = bytes.chunks_exact(4);
        Ok(match uniform.ty().component_kind() {
            ComponentKind::Float => words.map(bytemuck::pod_read_unaligned::<f32>).collect(),
            _ => words
                .map(|w| bytemuck::pod_read_unaligned::<i32>(w) as f32)
                .collect(),
        })
    }

    /// `glGetUniformiv`: one element, with float components truncated toward zero.
    pub fn uniform_i32(&self, location: UniformLocation) -> Result<Vec<i32>, UniformApiError> {
        let (uniform, bytes) = self.element_at(location)?;
        let words = bytes.chunks_exact(4);
        Ok(match uniform.ty().component_kind() {
            ComponentKind::Float => words
                .map(|w| bytemuck::pod_read_unaligned::<f32>(w) as i32)
                .collect(),
            _ => words.map(bytemuck::pod_read_unaligned::<i32>).collect(),
        })
    }

    fn element_at(
        &self,
        location: UniformLocation,
    ) -> Result<(&UniformDescriptor, &[u8]), UniformApiError> {
        let uniform = self
            .uniforms
            .get(location.uniform)
            .ok_or(UniformApiError::UnknownLocation(location))?;
        let bytes = uniform
            .element_bytes(location.element)
            .ok_or(UniformApiError::UnknownLocation(location))?;
        Ok((uniform, bytes))
    }
}
