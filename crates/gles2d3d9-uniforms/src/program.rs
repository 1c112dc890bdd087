use gles2d3d9_types::{row_count_of, Precision, RegisterFile, UniformType};
use hashbrown::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::alloc::{allocate, RegisterUsage, ShaderUsage};
use crate::limits::LinkConfig;
use crate::stage::{PerStage, ShaderStage};
use crate::uniform::UniformDescriptor;

/// An active uniform as reported by the shader compiler (`glGetActiveUniform`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    pub name: String,
    /// Raw `GL_*` type enum.
    pub gl_type: u32,
    pub precision: Precision,
    /// 0 for non-array uniforms.
    pub array_size: usize,
}

impl ActiveUniform {
    pub fn new(name: impl Into<String>, ty: UniformType, array_size: usize) -> Self {
        Self {
            name: name.into(),
            gl_type: ty.to_gl_enum(),
            precision: Precision::default(),
            array_size,
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("uniform {name:?} has unrecognized type 0x{gl_type:04x}")]
    UnrecognizedType { name: String, gl_type: u32 },
    #[error("active uniform with an empty name")]
    EmptyName,
    #[error("uniform {0:?} is declared more than once")]
    DuplicateUniform(String),
    #[error("uniform {name:?}[{array_size}] exceeds {max_registers} {file} registers per stage")]
    ArrayTooLarge {
        name: String,
        array_size: usize,
        file: RegisterFile,
        max_registers: u16,
    },
    #[error("{stage} shader references unknown uniform {name:?}")]
    UnknownStageUniform { stage: ShaderStage, name: String },
    #[error("{stage} shader needs {required} {file} registers but only {available} are available")]
    OutOfRegisters {
        stage: ShaderStage,
        file: RegisterFile,
        required: usize,
        available: usize,
    },
}

/// Strips the `[0]` suffix compilers report for array uniforms.
pub(crate) fn normalize_uniform_name(name: &str) -> &str {
    name.strip_suffix("[0]").unwrap_or(name)
}

/// The uniform set of a successfully linked program.
///
/// Descriptors keep the order the compiler reported them in; that order drives allocation and
/// upload enumeration. Relinking builds a fresh `LinkedProgram` and drops the old one.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub(crate) uniforms: Vec<UniformDescriptor>,
    pub(crate) by_name: HashMap<String, usize>,
    register_usage: PerStage<RegisterUsage>,
}

impl LinkedProgram {
    pub fn link(
        active: &[ActiveUniform],
        usage: &ShaderUsage,
        config: &LinkConfig,
    ) -> Result<Self, LinkError> {
        let result = Self::link_inner(active, usage, config);
        if let Err(err) = &result {
            warn!(%err, uniforms = active.len(), "program link failed");
        }
        result
    }

    fn link_inner(
        active: &[ActiveUniform],
        usage: &ShaderUsage,
        config: &LinkConfig,
    ) -> Result<Self, LinkError> {
        let mut uniforms = Vec::with_capacity(active.len());
        let mut by_name = HashMap::with_capacity(active.len());

        for a in active {
            let name = normalize_uniform_name(&a.name);
            if name.is_empty() {
                return Err(LinkError::EmptyName);
            }
            let ty = UniformType::from_gl_enum(a.gl_type).ok_or_else(|| {
                LinkError::UnrecognizedType {
                    name: name.to_owned(),
                    gl_type: a.gl_type,
                }
            })?;
            // Bounded before the descriptor sizes its storage from `array_size`.
            let file = ty.register_file();
            let max_registers = config.max_available(file);
            let fits = row_count_of(ty)
                .checked_mul(a.array_size.max(1))
                .is_some_and(|rows| rows <= usize::from(max_registers));
            if !fits {
                return Err(LinkError::ArrayTooLarge {
                    name: name.to_owned(),
                    array_size: a.array_size,
                    file,
                    max_registers,
                });
            }
            if by_name.insert(name.to_owned(), uniforms.len()).is_some() {
                return Err(LinkError::DuplicateUniform(name.to_owned()));
            }
            uniforms.push(UniformDescriptor::new(ty, a.precision, name, a.array_size));
        }

        let register_usage = allocate(&mut uniforms, usage, config)?;

        debug!(uniforms = uniforms.len(), "linked program uniforms");
        Ok(Self {
            uniforms,
            by_name,
            register_usage,
        })
    }

    pub fn uniforms(&self) -> &[UniformDescriptor] {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformDescriptor> {
        self.index_of(name).map(|i| &self.uniforms[i])
    }

    pub fn active_uniform_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Registers consumed by this program in `stage`.
    pub fn register_usage(&self, stage: ShaderStage) -> RegisterUsage {
        *self.register_usage.get(stage)
    }

    pub fn is_dirty(&self) -> bool {
        self.uniforms.iter().any(UniformDescriptor::is_dirty)
    }

    /// Marks every uniform dirty so the next upload rewrites the whole constant file, e.g. after
    /// the backing device was lost or another program's constants were bound.
    pub fn force_dirty_all(&mut self) {
        self.uniforms.iter_mut().for_each(UniformDescriptor::mark_dirty);
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(normalize_uniform_name(name)).copied()
    }
}
