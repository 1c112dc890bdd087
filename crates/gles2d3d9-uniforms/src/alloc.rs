//! Per-stage register allocation for a program's uniforms.

use std::collections::BTreeSet;

use gles2d3d9_types::RegisterFile;
use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::limits::LinkConfig;
use crate::program::{normalize_uniform_name, LinkError};
use crate::stage::{PerStage, ShaderStage};
use crate::uniform::UniformDescriptor;

/// Uniform names referenced by each stage's compiled code.
///
/// Array uniforms are referenced by their base name; a trailing `[0]` is accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderUsage {
    stages: PerStage<BTreeSet<String>>,
}

impl ShaderUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage<I, S>(mut self, stage: ShaderStage, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.insert(stage, name.as_ref());
        }
        self
    }

    pub fn insert(&mut self, stage: ShaderStage, name: &str) {
        self.stages
            .get_mut(stage)
            .insert(normalize_uniform_name(name).to_owned());
    }

    pub fn is_used(&self, stage: ShaderStage, name: &str) -> bool {
        self.stages.get(stage).contains(name)
    }

    pub fn names(&self, stage: ShaderStage) -> impl Iterator<Item = &str> {
        self.stages.get(stage).iter().map(String::as_str)
    }
}

/// Registers consumed in one stage after allocation, including reserved registers.
///
/// These are exclusive upper bounds, suitable for sizing the stage's constant file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterUsage {
    pub float_registers: u16,
    pub sampler_registers: u16,
}

impl RegisterUsage {
    fn cursor_mut(&mut self, file: RegisterFile) -> &mut u16 {
        match file {
            RegisterFile::Float => &mut self.float_registers,
            RegisterFile::Sampler => &mut self.sampler_registers,
        }
    }
}

struct Placement {
    uniform: usize,
    stage: ShaderStage,
    start: u16,
}

/// Rejects stage references to names the program does not declare.
fn check_stage_names(uniforms: &[UniformDescriptor], usage: &ShaderUsage) -> Result<(), LinkError> {
    let known: HashSet<&str> = uniforms.iter().map(UniformDescriptor::name).collect();
    for stage in ShaderStage::ALL {
        if let Some(name) = usage.names(stage).find(|name| !known.contains(name)) {
            return Err(LinkError::UnknownStageUniform {
                stage,
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}

/// Assigns every used uniform a contiguous register range in each stage that references it.
///
/// Uniforms are packed in slice order, floats after the stage's reserved registers and samplers
/// from `s0`. The whole program is planned before anything is bound, so on error no descriptor
/// carries a binding.
pub(crate) fn allocate(
    uniforms: &mut [UniformDescriptor],
    usage: &ShaderUsage,
    config: &LinkConfig,
) -> Result<PerStage<RegisterUsage>, LinkError> {
    check_stage_names(uniforms, usage)?;

    let mut plan = Vec::new();
    let mut totals = PerStage::<RegisterUsage>::default();

    for stage in ShaderStage::ALL {
        let limits = config.limits(stage);

        for file in [RegisterFile::Float, RegisterFile::Sampler] {
            let (base, limit) = match file {
                RegisterFile::Float => (limits.reserved_float_registers, limits.float_registers),
                RegisterFile::Sampler => (0, limits.sampler_registers),
            };

            let users = uniforms
                .iter()
                .enumerate()
                .filter(|(_, u)| u.register_file() == file && usage.is_used(stage, u.name()));

            let required: usize = users.clone().map(|(_, u)| u.register_count()).sum();
            let available = limit.saturating_sub(base);
            if required > usize::from(available) {
                return Err(LinkError::OutOfRegisters {
                    stage,
                    file,
                    required,
                    available: usize::from(available),
                });
            }

            // `required <= available` keeps every start below `limit`.
            let mut cursor = base;
            for (index, u) in users {
                plan.push(Placement {
                    uniform: index,
                    stage,
                    start: cursor,
                });
                cursor += u.register_count() as u16;
            }
            *totals.get_mut(stage).cursor_mut(file) = cursor;
        }
    }

    for Placement {
        uniform,
        stage,
        start,
    } in plan
    {
        let u = &mut uniforms[uniform];
        trace!(
            name = u.name(),
            %stage,
            file = %u.register_file(),
            start,
            count = u.register_count(),
            "bound uniform registers"
        );
        u.bind_register(stage, start);
    }

    for stage in ShaderStage::ALL {
        let used = totals.get(stage);
        debug!(
            %stage,
            float_registers = used.float_registers,
            sampler_registers = used.sampler_registers,
            "allocated uniform registers"
        );
    }

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use gles2d3d9_types::{Precision, UniformType};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::limits::{RegisterLimits, ShaderModel};

    fn uniform(ty: UniformType, name: &str, array_size: usize) -> UniformDescriptor {
        UniformDescriptor::new(ty, Precision::High, name, array_size)
    }

    fn ranges_overlap(a: (u16, usize), b: (u16, usize)) -> bool {
        let (a0, a1) = (a.0 as usize, a.0 as usize + a.1);
        let (b0, b1) = (b.0 as usize, b.0 as usize + b.1);
        a0 < b1 && b0 < a1
    }

    #[test]
    fn stage_only_uniforms_stay_unbound_elsewhere() {
        let mut uniforms = vec![
            uniform(UniformType::FloatMat4, "u_mvp", 0),
            uniform(UniformType::FloatVec4, "u_color", 0),
        ];
        let usage = ShaderUsage::new()
            .with_stage(ShaderStage::Vertex, ["u_mvp"])
            .with_stage(ShaderStage::Pixel, ["u_color"]);

        allocate(&mut uniforms, &usage, &LinkConfig::default()).unwrap();

        assert_eq!(uniforms[0].vs_register(), Some(0));
        assert_eq!(uniforms[0].ps_register(), None);
        assert_eq!(uniforms[1].vs_register(), None);
        assert_eq!(uniforms[1].ps_register(), Some(0));
    }

    #[test]
    fn ranges_never_overlap_within_a_stage() {
        let mut uniforms = vec![
            uniform(UniformType::FloatMat3, "a", 2),
            uniform(UniformType::Float, "b", 0),
            uniform(UniformType::FloatVec4, "c", 5),
            uniform(UniformType::BoolVec2, "d", 0),
        ];
        let names = ["a", "b", "c", "d"];
        let usage = ShaderUsage::new()
            .with_stage(ShaderStage::Vertex, names)
            .with_stage(ShaderStage::Pixel, ["c", "a"]);

        let used = allocate(&mut uniforms, &usage, &LinkConfig::default()).unwrap();
        assert_eq!(used.vertex.float_registers, 6 + 1 + 5 + 1);
        assert_eq!(used.pixel.float_registers, 6 + 5);

        for stage in ShaderStage::ALL {
            let bound: Vec<_> = uniforms
                .iter()
                .filter_map(|u| u.register(stage).map(|r| (r, u.register_count())))
                .collect();
            for (i, a) in bound.iter().enumerate() {
                for b in &bound[i + 1..] {
                    assert!(!ranges_overlap(*a, *b), "{stage}: {a:?} overlaps {b:?}");
                }
            }
        }
    }

    #[test]
    fn samplers_use_their_own_file() {
        let mut uniforms = vec![
            uniform(UniformType::FloatVec4, "u_tint", 0),
            uniform(UniformType::Sampler2D, "u_tex", 0),
            uniform(UniformType::SamplerCube, "u_env", 0),
        ];
        let usage =
            ShaderUsage::new().with_stage(ShaderStage::Pixel, ["u_tint", "u_tex", "u_env"]);

        let used = allocate(&mut uniforms, &usage, &LinkConfig::default()).unwrap();
        assert_eq!(uniforms[0].ps_register(), Some(0));
        assert_eq!(uniforms[1].ps_register(), Some(0));
        assert_eq!(uniforms[2].ps_register(), Some(1));
        assert_eq!(
            used.pixel,
            RegisterUsage {
                float_registers: 1,
                sampler_registers: 2
            }
        );
    }

    #[test]
    fn reserved_registers_are_skipped() {
        let mut uniforms = vec![uniform(UniformType::FloatVec4, "u", 0)];
        let usage = ShaderUsage::new().with_stage(ShaderStage::Vertex, ["u"]);
        let config = LinkConfig::default().with_reserved_float_registers(ShaderStage::Vertex, 2);

        allocate(&mut uniforms, &usage, &config).unwrap();
        assert_eq!(uniforms[0].vs_register(), Some(2));
    }

    #[test]
    fn exhaustion_fails_without_binding_anything() {
        // 9 mat4s = 36 registers > 32 available to ps_2_0.
        let mut uniforms = vec![
            uniform(UniformType::FloatVec4, "u_first", 0),
            uniform(UniformType::FloatMat4, "u_bones", 9),
        ];
        let usage = ShaderUsage::new()
            .with_stage(ShaderStage::Vertex, ["u_first", "u_bones"])
            .with_stage(ShaderStage::Pixel, ["u_first", "u_bones"]);
        let config = LinkConfig::for_shader_model(ShaderModel::Sm2);

        let err = allocate(&mut uniforms, &usage, &config).unwrap_err();
        assert_eq!(
            err,
            LinkError::OutOfRegisters {
                stage: ShaderStage::Pixel,
                file: RegisterFile::Float,
                required: 37,
                available: 32,
            }
        );
        // The vertex stage had room but must not have been bound either.
        assert!(uniforms.iter().all(|u| u.bound_stages().is_empty()));
    }

    #[test]
    fn sm2_vertex_shaders_have_no_samplers() {
        let mut uniforms = vec![uniform(UniformType::Sampler2D, "u_heightmap", 0)];
        let usage = ShaderUsage::new().with_stage(ShaderStage::Vertex, ["u_heightmap"]);
        let err = allocate(
            &mut uniforms,
            &usage,
            &LinkConfig::for_shader_model(ShaderModel::Sm2),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LinkError::OutOfRegisters {
                file: RegisterFile::Sampler,
                ..
            }
        ));
    }

    #[test]
    fn exact_fit_succeeds() {
        let mut uniforms = vec![uniform(UniformType::FloatVec4, "u", 8)];
        let usage = ShaderUsage::new().with_stage(ShaderStage::Pixel, ["u"]);
        let mut config = LinkConfig::default();
        config.limits.pixel = RegisterLimits::new(8, 0);
        let used = allocate(&mut uniforms, &usage, &config).unwrap();
        assert_eq!(used.pixel.float_registers, 8);
    }

    #[test]
    fn unknown_stage_reference_fails() {
        let mut uniforms = vec![uniform(UniformType::Float, "u_known", 0)];
        let usage = ShaderUsage::new().with_stage(ShaderStage::Pixel, ["u_missing"]);
        let err = allocate(&mut uniforms, &usage, &LinkConfig::default()).unwrap_err();
        assert_eq!(
            err,
            LinkError::UnknownStageUniform {
                stage: ShaderStage::Pixel,
                name: "u_missing".into()
            }
        );
    }

    #[test]
    fn array_references_use_base_name() {
        let usage = ShaderUsage::new().with_stage(ShaderStage::Vertex, ["u_lights[0]"]);
        assert!(usage.is_used(ShaderStage::Vertex, "u_lights"));
        assert!(!usage.is_used(ShaderStage::Pixel, "u_lights"));
    }
}
