use gles2d3d9_types::{row_count_of, Precision, RegisterFile, UniformType};
use thiserror::Error;

use crate::stage::{PerStage, ShaderStage, ShaderStageFlags};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformError {
    #[error("elements {start}..{start}+{count} out of range for uniform with {len} element(s)")]
    OutOfRange { start: usize, count: usize, len: usize },
    #[error("value payload is {actual} bytes but {expected} bytes were expected")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Metadata and client-side storage for one active uniform of a linked program.
///
/// `data` holds every element packed back to back in the type's native representation
/// (native-endian 32-bit components, matrices column-major). Register placement is only known
/// once the program's allocator has run; until then both stages report `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDescriptor {
    ty: UniformType,
    precision: Precision,
    name: String,
    array_size: usize,
    data: Vec<u8>,
    dirty: bool,
    registers: PerStage<Option<u16>>,
    register_count: usize,
}

impl UniformDescriptor {
    /// Builds a zeroed, dirty, unbound descriptor. `array_size == 0` declares a non-array
    /// uniform.
    pub fn new(
        ty: UniformType,
        precision: Precision,
        name: impl Into<String>,
        array_size: usize,
    ) -> Self {
        let name = name.into();
        debug_assert!(!name.is_empty(), "uniform names are validated by the linker");

        let elements = array_size.max(1);
        Self {
            ty,
            precision,
            name,
            array_size,
            data: vec![0u8; ty.element_size() * elements],
            dirty: true,
            registers: PerStage::new(None, None),
            register_count: row_count_of(ty) * elements,
        }
    }

    pub fn ty(&self) -> UniformType {
        self.ty
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn is_array(&self) -> bool {
        self.array_size > 0
    }

    pub fn element_count(&self) -> usize {
        self.array_size.max(1)
    }

    pub fn register_file(&self) -> RegisterFile {
        self.ty.register_file()
    }

    /// Registers occupied in each stage the uniform is bound in, across all elements.
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    pub fn register(&self, stage: ShaderStage) -> Option<u16> {
        *self.registers.get(stage)
    }

    pub fn vs_register(&self) -> Option<u16> {
        self.register(ShaderStage::Vertex)
    }

    pub fn ps_register(&self) -> Option<u16> {
        self.register(ShaderStage::Pixel)
    }

    pub fn bound_stages(&self) -> ShaderStageFlags {
        ShaderStage::ALL
            .into_iter()
            .filter(|&stage| self.register(stage).is_some())
            .fold(ShaderStageFlags::empty(), |acc, stage| acc | stage.flag())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes of a single element, or `None` past the end of the array.
    pub fn element_bytes(&self, element: usize) -> Option<&[u8]> {
        let size = self.ty.element_size();
        let start = element.checked_mul(size)?;
        self.data.get(start..start.checked_add(size)?)
    }

    /// Copies `element_count` elements from `bytes` into storage starting at `element_start`.
    ///
    /// `bytes` must hold exactly `element_count` elements. On error nothing changes; on success
    /// the descriptor is dirty even if the bytes were identical.
    pub fn set_value(
        &mut self,
        bytes: &[u8],
        element_start: usize,
        element_count: usize,
    ) -> Result<(), UniformError> {
        let len = self.element_count();
        let end = element_start
            .checked_add(element_count)
            .filter(|&end| end <= len)
            .ok_or(UniformError::OutOfRange {
                start: element_start,
                count: element_count,
                len,
            })?;

        let size = self.ty.element_size();
        let expected = element_count * size;
        if bytes.len() != expected {
            return Err(UniformError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        self.data[element_start * size..end * size].copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called by the upload step once every bound stage has received the current bytes.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Records the allocator's placement for `stage`. Placement is fixed for the life of the
    /// linked program.
    pub(crate) fn bind_register(&mut self, stage: ShaderStage, start: u16) {
        let slot = self.registers.get_mut(stage);
        debug_assert!(
            slot.is_none(),
            "uniform {} already bound in {stage}",
            self.name
        );
        *slot = Some(start);
    }
}
