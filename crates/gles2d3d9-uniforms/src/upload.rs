//! Pushes dirty uniform storage into per-stage constant register files.

use std::ops::Range;

use gles2d3d9_types::{column_count_of, row_count_of, ComponentKind, RegisterFile};
use thiserror::Error;
use tracing::{debug, trace};

use crate::alloc::RegisterUsage;
use crate::limits::LinkConfig;
use crate::program::LinkedProgram;
use crate::stage::{PerStage, ShaderStage};
use crate::uniform::UniformDescriptor;

/// One `c#` register.
pub type Vec4 = [f32; 4];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("{stage} {file} registers {start}..{end} exceed the constant file size {capacity}")]
    RegisterOutOfRange {
        stage: ShaderStage,
        file: RegisterFile,
        start: usize,
        end: usize,
        capacity: usize,
    },
    #[error("sampler uniform {name:?} holds negative texture unit {unit}")]
    InvalidSamplerUnit { name: String, unit: i32 },
}

/// Destination of uniform uploads, typically a wrapper around the backend's per-stage constant
/// buffers.
pub trait ConstantSink {
    fn write_float_registers(
        &mut self,
        stage: ShaderStage,
        start: u16,
        registers: &[Vec4],
    ) -> Result<(), UploadError>;

    fn write_sampler(&mut self, stage: ShaderStage, slot: u16, unit: u32)
        -> Result<(), UploadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadStats {
    pub uniforms_uploaded: usize,
    pub float_registers_written: usize,
    pub samplers_written: usize,
}

/// CPU copy of one stage's `c#` and `s#` files.
///
/// Tracks the range of float registers written since the last [`ConstantFile::take_dirty_range`]
/// so the backend only needs to re-upload that window of its constant buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantFile {
    float_registers: Vec<Vec4>,
    samplers: Vec<Option<u32>>,
    dirty_range: Option<Range<u16>>,
    samplers_dirty: bool,
}

impl ConstantFile {
    pub fn new(float_registers: u16, sampler_registers: u16) -> Self {
        Self {
            float_registers: vec![[0.0; 4]; usize::from(float_registers)],
            samplers: vec![None; usize::from(sampler_registers)],
            dirty_range: None,
            samplers_dirty: false,
        }
    }

    pub fn for_usage(usage: RegisterUsage) -> Self {
        Self::new(usage.float_registers, usage.sampler_registers)
    }

    pub fn float_registers(&self) -> &[Vec4] {
        &self.float_registers
    }

    pub fn register(&self, index: u16) -> Option<Vec4> {
        self.float_registers.get(usize::from(index)).copied()
    }

    pub fn sampler(&self, slot: u16) -> Option<u32> {
        self.samplers.get(usize::from(slot)).copied().flatten()
    }

    /// The float file as bytes, laid out like a `array<vec4<f32>, N>` uniform buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.float_registers)
    }

    /// Returns and resets the float registers written since the last call.
    pub fn take_dirty_range(&mut self) -> Option<Range<u16>> {
        self.dirty_range.take()
    }

    /// Returns and resets whether any sampler slot was written since the last call.
    pub fn take_samplers_dirty(&mut self) -> bool {
        std::mem::take(&mut self.samplers_dirty)
    }

    fn write_float(
        &mut self,
        stage: ShaderStage,
        start: u16,
        registers: &[Vec4],
    ) -> Result<(), UploadError> {
        let begin = usize::from(start);
        let end = begin + registers.len();
        let capacity = self.float_registers.len();
        let dst = self
            .float_registers
            .get_mut(begin..end)
            .ok_or(UploadError::RegisterOutOfRange {
                stage,
                file: RegisterFile::Float,
                start: begin,
                end,
                capacity,
            })?;
        dst.copy_from_slice(registers);

        if registers.is_empty() {
            return Ok(());
        }
        // `end <= capacity`, and capacity came from a u16.
        let written = start..end as u16;
        self.dirty_range = Some(match self.dirty_range.take() {
            Some(r) => r.start.min(written.start)..r.end.max(written.end),
            None => written,
        });
        Ok(())
    }

    fn write_sampler(
        &mut self,
        stage: ShaderStage,
        slot: u16,
        unit: u32,
    ) -> Result<(), UploadError> {
        let capacity = self.samplers.len();
        let dst = self
            .samplers
            .get_mut(usize::from(slot))
            .ok_or(UploadError::RegisterOutOfRange {
                stage,
                file: RegisterFile::Sampler,
                start: usize::from(slot),
                end: usize::from(slot) + 1,
                capacity,
            })?;
        *dst = Some(unit);
        self.samplers_dirty = true;
        Ok(())
    }
}

/// In-memory [`ConstantSink`] holding one [`ConstantFile`] per stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConstants {
    files: PerStage<ConstantFile>,
}

impl StageConstants {
    /// Sized for the full register budget of `config`.
    pub fn new(config: &LinkConfig) -> Self {
        let file = |stage| {
            let limits = config.limits(stage);
            ConstantFile::new(limits.float_registers, limits.sampler_registers)
        };
        Self {
            files: PerStage::new(file(ShaderStage::Vertex), file(ShaderStage::Pixel)),
        }
    }

    /// Sized to exactly what `program` uses.
    pub fn for_program(program: &LinkedProgram) -> Self {
        let file = |stage| ConstantFile::for_usage(program.register_usage(stage));
        Self {
            files: PerStage::new(file(ShaderStage::Vertex), file(ShaderStage::Pixel)),
        }
    }

    pub fn stage(&self, stage: ShaderStage) -> &ConstantFile {
        self.files.get(stage)
    }

    pub fn stage_mut(&mut self, stage: ShaderStage) -> &mut ConstantFile {
        self.files.get_mut(stage)
    }
}

impl ConstantSink for StageConstants {
    fn write_float_registers(
        &mut self,
        stage: ShaderStage,
        start: u16,
        registers: &[Vec4],
    ) -> Result<(), UploadError> {
        self.files.get_mut(stage).write_float(stage, start, registers)
    }

    fn write_sampler(
        &mut self,
        stage: ShaderStage,
        slot: u16,
        unit: u32,
    ) -> Result<(), UploadError> {
        self.files.get_mut(stage).write_sampler(stage, slot, unit)
    }
}

/// Expands a float-file uniform into its registers: one register per matrix column (or one per
/// scalar/vector element), zero-padded to four lanes, ints and bools converted to float.
fn expand_float_registers(uniform: &UniformDescriptor, out: &mut Vec<Vec4>) {
    let ty = uniform.ty();
    let columns = column_count_of(ty);
    let as_float = |word: &[u8]| match ty.component_kind() {
        ComponentKind::Float => bytemuck::pod_read_unaligned::<f32>(word),
        _ => bytemuck::pod_read_unaligned::<i32>(word) as f32,
    };

    out.clear();
    out.reserve(uniform.register_count());
    for row in uniform.data().chunks_exact(columns * 4) {
        let mut register = [0.0f32; 4];
        for (lane, word) in register.iter_mut().zip(row.chunks_exact(4)) {
            *lane = as_float(word);
        }
        out.push(register);
    }
    debug_assert_eq!(out.len(), uniform.element_count() * row_count_of(ty));
}

fn upload_samplers(
    uniform: &UniformDescriptor,
    sink: &mut impl ConstantSink,
    stats: &mut UploadStats,
) -> Result<(), UploadError> {
    for stage in ShaderStage::ALL {
        let Some(start) = uniform.register(stage) else {
            continue;
        };
        for (element, word) in uniform.data().chunks_exact(4).enumerate() {
            let unit = bytemuck::pod_read_unaligned::<i32>(word);
            let unit = u32::try_from(unit).map_err(|_| UploadError::InvalidSamplerUnit {
                name: uniform.name().to_owned(),
                unit,
            })?;
            // The allocator reserved `element_count` slots starting at `start`.
            let slot = start + element as u16;
            trace!(name = uniform.name(), %stage, slot, unit, "upload sampler");
            sink.write_sampler(stage, slot, unit)?;
            stats.samplers_written += 1;
        }
    }
    Ok(())
}

/// Writes every dirty uniform of `program` into `sink` and marks it clean.
///
/// Uniforms are visited in link order. A uniform stays dirty if any of its writes fails; the
/// error is returned immediately and later uniforms are left for the next call.
pub fn upload_dirty(
    program: &mut LinkedProgram,
    sink: &mut impl ConstantSink,
) -> Result<UploadStats, UploadError> {
    let mut stats = UploadStats::default();
    let mut registers = Vec::new();

    for uniform in program.uniforms.iter_mut().filter(|u| u.is_dirty()) {
        match uniform.register_file() {
            RegisterFile::Float => {
                let bound: Vec<_> = ShaderStage::ALL
                    .into_iter()
                    .filter_map(|stage| uniform.register(stage).map(|start| (stage, start)))
                    .collect();
                if !bound.is_empty() {
                    expand_float_registers(uniform, &mut registers);
                }
                for (stage, start) in bound {
                    trace!(
                        name = uniform.name(),
                        %stage,
                        start,
                        count = registers.len(),
                        "upload float registers"
                    );
                    sink.write_float_registers(stage, start, &registers)?;
                    stats.float_registers_written += registers.len();
                }
            }
            RegisterFile::Sampler => upload_samplers(uniform, sink, &mut stats)?,
        }
        uniform.mark_clean();
        stats.uniforms_uploaded += 1;
    }

    if stats.uniforms_uploaded > 0 {
        debug!(
            uniforms = stats.uniforms_uploaded,
            float_registers = stats.float_registers_written,
            samplers = stats.samplers_written,
            "uploaded dirty uniforms"
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use gles2d3d9_types::UniformType;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::alloc::ShaderUsage;
    use crate::api::UniformValue;
    use crate::program::ActiveUniform;

    fn link(active: &[ActiveUniform], usage: ShaderUsage) -> LinkedProgram {
        LinkedProgram::link(active, &usage, &LinkConfig::default()).unwrap()
    }

    #[test]
    fn mat2_element_is_two_padded_registers() {
        let mut p = link(
            &[ActiveUniform::new("u_rot", UniformType::FloatMat2, 0)],
            ShaderUsage::new().with_stage(ShaderStage::Vertex, ["u_rot"]),
        );
        p.set_uniform("u_rot", UniformValue::matrix(2, &[1.0, 2.0, 3.0, 4.0]))
            .unwrap();

        let mut sink = StageConstants::for_program(&p);
        let stats = upload_dirty(&mut p, &mut sink).unwrap();

        let vs = sink.stage(ShaderStage::Vertex);
        assert_eq!(
            vs.float_registers(),
            &[[1.0, 2.0, 0.0, 0.0], [3.0, 4.0, 0.0, 0.0]]
        );
        assert_eq!(stats.float_registers_written, 2);
        assert!(!p.is_dirty());
    }

    #[test]
    fn ints_and_bools_arrive_as_floats() {
        let mut p = link(
            &[
                ActiveUniform::new("u_i", UniformType::IntVec3, 0),
                ActiveUniform::new("u_b", UniformType::Bool, 2),
            ],
            ShaderUsage::new().with_stage(ShaderStage::Pixel, ["u_i", "u_b"]),
        );
        p.set_uniform("u_i", UniformValue::int(3, &[-2, 0, 9])).unwrap();
        p.set_uniform("u_b[1]", UniformValue::int(1, &[5])).unwrap();

        let mut sink = StageConstants::for_program(&p);
        upload_dirty(&mut p, &mut sink).unwrap();

        let ps = sink.stage(ShaderStage::Pixel);
        assert_eq!(ps.register(0), Some([-2.0, 0.0, 9.0, 0.0]));
        assert_eq!(ps.register(1), Some([0.0, 0.0, 0.0, 0.0]));
        assert_eq!(ps.register(2), Some([1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn samplers_fill_sampler_table() {
        let mut p = link(
            &[
                ActiveUniform::new("u_shadow", UniformType::Sampler2D, 0),
                ActiveUniform::new("u_layers", UniformType::SamplerCube, 2),
            ],
            ShaderUsage::new()
                .with_stage(ShaderStage::Pixel, ["u_shadow", "u_layers"])
                .with_stage(ShaderStage::Vertex, ["u_layers"]),
        );
        p.set_uniform("u_shadow", UniformValue::int(1, &[4])).unwrap();
        p.set_uniform("u_layers", UniformValue::int(1, &[1, 2])).unwrap();

        let mut sink = StageConstants::new(&LinkConfig::default());
        let stats = upload_dirty(&mut p, &mut sink).unwrap();

        let ps = sink.stage(ShaderStage::Pixel);
        assert_eq!(ps.sampler(0), Some(4));
        assert_eq!(ps.sampler(1), Some(1));
        assert_eq!(ps.sampler(2), Some(2));
        let vs = sink.stage(ShaderStage::Vertex);
        assert_eq!(vs.sampler(0), Some(1));
        assert_eq!(vs.sampler(1), Some(2));
        assert_eq!(stats.samplers_written, 5);
        assert_eq!(stats.float_registers_written, 0);
    }

    #[test]
    fn clean_uniforms_are_skipped() {
        let mut p = link(
            &[
                ActiveUniform::new("u_a", UniformType::FloatVec4, 0),
                ActiveUniform::new("u_b", UniformType::FloatVec4, 0),
            ],
            ShaderUsage::new().with_stage(ShaderStage::Pixel, ["u_a", "u_b"]),
        );
        let mut sink = StageConstants::for_program(&p);
        assert_eq!(upload_dirty(&mut p, &mut sink).unwrap().uniforms_uploaded, 2);
        assert_eq!(
            sink.stage_mut(ShaderStage::Pixel).take_dirty_range(),
            Some(0..2)
        );

        p.set_uniform("u_b", UniformValue::float(4, &[1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        let stats = upload_dirty(&mut p, &mut sink).unwrap();
        assert_eq!(stats.uniforms_uploaded, 1);
        assert_eq!(stats.float_registers_written, 1);
        assert_eq!(
            sink.stage_mut(ShaderStage::Pixel).take_dirty_range(),
            Some(1..2)
        );

        assert_eq!(upload_dirty(&mut p, &mut sink).unwrap(), UploadStats::default());
        assert_eq!(sink.stage_mut(ShaderStage::Pixel).take_dirty_range(), None);
    }

    #[test]
    fn unbound_dirty_uniform_is_cleaned_without_writes() {
        let mut p = link(
            &[ActiveUniform::new("u_unused", UniformType::FloatMat3, 0)],
            ShaderUsage::new(),
        );
        let mut sink = StageConstants::for_program(&p);
        let stats = upload_dirty(&mut p, &mut sink).unwrap();
        assert_eq!(stats.uniforms_uploaded, 1);
        assert_eq!(stats.float_registers_written, 0);
        assert!(!p.is_dirty());
    }

    #[test]
    fn failed_write_leaves_uniform_dirty() {
        let mut p = link(
            &[ActiveUniform::new("u_big", UniformType::FloatVec4, 4)],
            ShaderUsage::new().with_stage(ShaderStage::Vertex, ["u_big"]),
        );
        let mut sink = StageConstants {
            files: PerStage::new(ConstantFile::new(2, 0), ConstantFile::new(0, 0)),
        };
        let err = upload_dirty(&mut p, &mut sink).unwrap_err();
        assert_eq!(
            err,
            UploadError::RegisterOutOfRange {
                stage: ShaderStage::Vertex,
                file: RegisterFile::Float,
                start: 0,
                end: 4,
                capacity: 2,
            }
        );
        assert!(p.uniform("u_big").unwrap().is_dirty());
    }

    #[test]
    fn negative_sampler_unit_is_reported() {
        let mut p = link(
            &[ActiveUniform::new("u_tex", UniformType::Sampler2D, 0)],
            ShaderUsage::new().with_stage(ShaderStage::Pixel, ["u_tex"]),
        );
        p.uniforms[0]
            .set_value(bytemuck::bytes_of(&-3i32), 0, 1)
            .unwrap();
        let mut sink = StageConstants::for_program(&p);
        let err = upload_dirty(&mut p, &mut sink).unwrap_err();
        assert_eq!(
            err,
            UploadError::InvalidSamplerUnit {
                name: "u_tex".into(),
                unit: -3
            }
        );
    }

    #[test]
    fn constant_file_bytes_match_registers() {
        let mut file = ConstantFile::new(2, 0);
        file.write_float(ShaderStage::Pixel, 1, &[[1.0, 2.0, 3.0, 4.0]])
            .unwrap();
        let bytes = file.as_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[16..20], &1.0f32.to_ne_bytes());
    }
}
