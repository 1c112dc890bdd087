use std::fmt;

/// GLSL ES 1.00 uniform types that can be backed by a D3D9 register file.
///
/// This is a closed set: anything the compiler reports outside of it must be rejected before a
/// descriptor is built (see [`UniformType::from_gl_enum`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniformType {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    Int,
    IntVec2,
    IntVec3,
    IntVec4,
    Bool,
    BoolVec2,
    BoolVec3,
    BoolVec4,
    FloatMat2,
    FloatMat3,
    FloatMat4,
    Sampler2D,
    SamplerCube,
    /// `samplerExternalOES` (`OES_EGL_image_external`).
    SamplerExternalOes,
}

/// Scalar representation of a uniform's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Float,
    Int,
    /// Stored as a 32-bit integer holding 0 or 1.
    Bool,
    /// Stored as a 32-bit integer holding the texture unit index.
    Sampler,
}

/// Which per-stage register file a uniform occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterFile {
    /// `c#` float4 constant registers. Integer and boolean uniforms are emulated here.
    Float,
    /// `s#` sampler registers.
    Sampler,
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterFile::Float => f.write_str("c#"),
            RegisterFile::Sampler => f.write_str("s#"),
        }
    }
}

impl UniformType {
    /// Every recognized type, in declaration order.
    pub const ALL: [UniformType; 18] = [
        UniformType::Float,
        UniformType::FloatVec2,
        UniformType::FloatVec3,
        UniformType::FloatVec4,
        UniformType::Int,
        UniformType::IntVec2,
        UniformType::IntVec3,
        UniformType::IntVec4,
        UniformType::Bool,
        UniformType::BoolVec2,
        UniformType::BoolVec3,
        UniformType::BoolVec4,
        UniformType::FloatMat2,
        UniformType::FloatMat3,
        UniformType::FloatMat4,
        UniformType::Sampler2D,
        UniformType::SamplerCube,
        UniformType::SamplerExternalOes,
    ];

    /// Decodes a GLES `GL_*` type enum as reported by `glGetActiveUniform`.
    pub const fn from_gl_enum(value: u32) -> Option<Self> {
        Some(match value {
            0x1406 => Self::Float,
            0x8B50 => Self::FloatVec2,
            0x8B51 => Self::FloatVec3,
            0x8B52 => Self::FloatVec4,
            0x1404 => Self::Int,
            0x8B53 => Self::IntVec2,
            0x8B54 => Self::IntVec3,
            0x8B55 => Self::IntVec4,
            0x8B56 => Self::Bool,
            0x8B57 => Self::BoolVec2,
            0x8B58 => Self::BoolVec3,
            0x8B59 => Self::BoolVec4,
            0x8B5A => Self::FloatMat2,
            0x8B5B => Self::FloatMat3,
            0x8B5C => Self::FloatMat4,
            0x8B5E => Self::Sampler2D,
            0x8B60 => Self::SamplerCube,
            0x8D66 => Self::SamplerExternalOes,
            _ => return None,
        })
    }

    pub const fn to_gl_enum(self) -> u32 {
        match self {
            Self::Float => 0x1406,
            Self::FloatVec2 => 0x8B50,
            Self::FloatVec3 => 0x8B51,
            Self::FloatVec4 => 0x8B52,
            Self::Int => 0x1404,
            Self::IntVec2 => 0x8B53,
            Self::IntVec3 => 0x8B54,
            Self::IntVec4 => 0x8B55,
            Self::Bool => 0x8B56,
            Self::BoolVec2 => 0x8B57,
            Self::BoolVec3 => 0x8B58,
            Self::BoolVec4 => 0x8B59,
            Self::FloatMat2 => 0x8B5A,
            Self::FloatMat3 => 0x8B5B,
            Self::FloatMat4 => 0x8B5C,
            Self::Sampler2D => 0x8B5E,
            Self::SamplerCube => 0x8B60,
            Self::SamplerExternalOes => 0x8D66,
        }
    }

    pub const fn component_kind(self) -> ComponentKind {
        match self {
            Self::Float
            | Self::FloatVec2
            | Self::FloatVec3
            | Self::FloatVec4
            | Self::FloatMat2
            | Self::FloatMat3
            | Self::FloatMat4 => ComponentKind::Float,
            Self::Int | Self::IntVec2 | Self::IntVec3 | Self::IntVec4 => ComponentKind::Int,
            Self::Bool | Self::BoolVec2 | Self::BoolVec3 | Self::BoolVec4 => ComponentKind::Bool,
            Self::Sampler2D | Self::SamplerCube | Self::SamplerExternalOes => {
                ComponentKind::Sampler
            }
        }
    }

    pub const fn register_file(self) -> RegisterFile {
        match self.component_kind() {
            ComponentKind::Sampler => RegisterFile::Sampler,
            _ => RegisterFile::Float,
        }
    }

    pub const fn is_matrix(self) -> bool {
        matches!(self, Self::FloatMat2 | Self::FloatMat3 | Self::FloatMat4)
    }

    pub const fn is_sampler(self) -> bool {
        matches!(self.component_kind(), ComponentKind::Sampler)
    }

    /// Bytes occupied by one element (all components of one array entry).
    pub const fn element_size(self) -> usize {
        byte_size_of(self) * component_count_of(self)
    }

    pub const fn as_glsl_keyword(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::FloatVec2 => "vec2",
            Self::FloatVec3 => "vec3",
            Self::FloatVec4 => "vec4",
            Self::Int => "int",
            Self::IntVec2 => "ivec2",
            Self::IntVec3 => "ivec3",
            Self::IntVec4 => "ivec4",
            Self::Bool => "bool",
            Self::BoolVec2 => "bvec2",
            Self::BoolVec3 => "bvec3",
            Self::BoolVec4 => "bvec4",
            Self::FloatMat2 => "mat2",
            Self::FloatMat3 => "mat3",
            Self::FloatMat4 => "mat4",
            Self::Sampler2D => "sampler2D",
            Self::SamplerCube => "samplerCube",
            Self::SamplerExternalOes => "samplerExternalOES",
        }
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_glsl_keyword())
    }
}

/// Bytes required for a single component of `ty`.
///
/// Every GLSL ES 1.00 component is 32 bits wide on the client side: floats as `f32`, ints and
/// bools as `i32`, samplers as the `i32` texture unit set through `glUniform1i`.
pub const fn byte_size_of(ty: UniformType) -> usize {
    match ty.component_kind() {
        ComponentKind::Float => std::mem::size_of::<f32>(),
        ComponentKind::Int | ComponentKind::Bool | ComponentKind::Sampler => {
            std::mem::size_of::<i32>()
        }
    }
}

/// Scalar components per element: 1 for scalars and samplers, 2/3/4 for vectors, N² for NxN
/// matrices.
pub const fn component_count_of(ty: UniformType) -> usize {
    use UniformType::*;
    match ty {
        Float | Int | Bool | Sampler2D | SamplerCube | SamplerExternalOes => 1,
        FloatVec2 | IntVec2 | BoolVec2 => 2,
        FloatVec3 | IntVec3 | BoolVec3 => 3,
        FloatVec4 | IntVec4 | BoolVec4 => 4,
        FloatMat2 => 4,
        FloatMat3 => 9,
        FloatMat4 => 16,
    }
}

/// Registers one element occupies in its [`RegisterFile`].
///
/// Scalars and vectors fit in one float4 register. An NxN matrix takes one register per column.
/// Samplers take a single `s#` slot.
pub const fn row_count_of(ty: UniformType) -> usize {
    match ty {
        UniformType::FloatMat2 => 2,
        UniformType::FloatMat3 => 3,
        UniformType::FloatMat4 => 4,
        _ => 1,
    }
}

/// Components stored in each register row of one element.
pub const fn column_count_of(ty: UniformType) -> usize {
    component_count_of(ty) / row_count_of(ty)
}
