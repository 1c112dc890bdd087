//! Register budgets and link configuration.
//!
//! The budgets mirror the D3D9 caps a GLES-on-D3D9 layer targets. Shader model 2.0 pixel
//! shaders only expose 32 float constants, which is the usual reason a large GLES program fails
//! to link on that path.

use gles2d3d9_types::RegisterFile;
use thiserror::Error;

use crate::stage::{PerStage, ShaderStage};

/// Float constant registers available to vertex shaders (SM2 and SM3).
pub const MAX_VS_FLOAT_REGISTERS: u16 = 256;
/// Float constant registers available to `ps_2_0` pixel shaders.
pub const MAX_PS2_FLOAT_REGISTERS: u16 = 32;
/// Float constant registers available to `ps_3_0` pixel shaders.
pub const MAX_PS3_FLOAT_REGISTERS: u16 = 224;
/// Vertex texture fetch samplers (`D3DVERTEXTEXTURESAMPLER0..3`), SM3 only.
pub const MAX_VS3_SAMPLERS: u16 = 4;
/// Pixel shader sampler registers.
pub const MAX_PS_SAMPLERS: u16 = 16;

const SHADER_MODEL_ENV: &str = "GLES2D3D9_SHADER_MODEL";
const RESERVED_VS_ENV: &str = "GLES2D3D9_RESERVED_VS_REGISTERS";
const RESERVED_PS_ENV: &str = "GLES2D3D9_RESERVED_PS_REGISTERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderModel {
    Sm2,
    Sm3,
}

/// Register budget for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLimits {
    pub float_registers: u16,
    pub sampler_registers: u16,
    /// Leading float registers owned by the translator itself (e.g. viewport/depth-range
    /// adjustment constants). User uniforms are allocated after them.
    pub reserved_float_registers: u16,
}

impl RegisterLimits {
    pub const fn new(float_registers: u16, sampler_registers: u16) -> Self {
        Self {
            float_registers,
            sampler_registers,
            reserved_float_registers: 0,
        }
    }

    /// Float registers left for user uniforms.
    pub const fn available_float_registers(&self) -> u16 {
        self.float_registers
            .saturating_sub(self.reserved_float_registers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub limits: PerStage<RegisterLimits>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::for_shader_model(ShaderModel::Sm3)
    }
}

impl LinkConfig {
    pub const fn for_shader_model(model: ShaderModel) -> Self {
        let limits = match model {
            ShaderModel::Sm2 => PerStage::new(
                RegisterLimits::new(MAX_VS_FLOAT_REGISTERS, 0),
                RegisterLimits::new(MAX_PS2_FLOAT_REGISTERS, MAX_PS_SAMPLERS),
            ),
            ShaderModel::Sm3 => PerStage::new(
                RegisterLimits::new(MAX_VS_FLOAT_REGISTERS, MAX_VS3_SAMPLERS),
                RegisterLimits::new(MAX_PS3_FLOAT_REGISTERS, MAX_PS_SAMPLERS),
            ),
        };
        Self { limits }
    }

    pub fn with_reserved_float_registers(mut self, stage: ShaderStage, count: u16) -> Self {
        self.limits.get_mut(stage).reserved_float_registers = count;
        self
    }

    pub fn limits(&self, stage: ShaderStage) -> &RegisterLimits {
        self.limits.get(stage)
    }

    /// Largest register range any single stage can still hand out from `file`.
    pub fn max_available(&self, file: RegisterFile) -> u16 {
        ShaderStage::ALL
            .into_iter()
            .map(|stage| {
                let limits = self.limits(stage);
                match file {
                    RegisterFile::Float => limits.available_float_registers(),
                    RegisterFile::Sampler => limits.sampler_registers,
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Builds a config from `GLES2D3D9_SHADER_MODEL` (`2` or `3`, default `3`) and the optional
    /// `GLES2D3D9_RESERVED_{VS,PS}_REGISTERS` counts.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let model = match lookup(SHADER_MODEL_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("3") => ShaderModel::Sm3,
            Some("2") => ShaderModel::Sm2,
            Some(_) => return Err(ConfigError::InvalidEnv(SHADER_MODEL_ENV)),
        };
        let mut config = Self::for_shader_model(model);

        for (stage, key) in [
            (ShaderStage::Vertex, RESERVED_VS_ENV),
            (ShaderStage::Pixel, RESERVED_PS_ENV),
        ] {
            let Some(raw) = lookup(key) else {
                continue;
            };
            let reserved = raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidEnv(key))?;
            if reserved > config.limits(stage).float_registers {
                return Err(ConfigError::InvalidEnv(key));
            }
            config = config.with_reserved_float_registers(stage, reserved);
        }

        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(
        vars: &'a HashMap<&'static str, &'static str>,
    ) -> impl Fn(&'static str) -> Option<String> + 'a {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn default_is_sm3() {
        let config = LinkConfig::default();
        assert_eq!(config.limits(ShaderStage::Vertex).float_registers, 256);
        assert_eq!(config.limits(ShaderStage::Pixel).float_registers, 224);
        assert_eq!(config.limits(ShaderStage::Vertex).sampler_registers, 4);
    }

    #[test]
    fn env_selects_sm2_and_reservations() {
        let vars = HashMap::from([
            (SHADER_MODEL_ENV, "2"),
            (RESERVED_VS_ENV, " 3 "),
            (RESERVED_PS_ENV, "1"),
        ]);
        let config = LinkConfig::from_lookup(lookup_from(&vars)).unwrap();
        let ps = config.limits(ShaderStage::Pixel);
        assert_eq!(ps.float_registers, 32);
        assert_eq!(ps.reserved_float_registers, 1);
        assert_eq!(ps.available_float_registers(), 31);
        assert_eq!(config.limits(ShaderStage::Vertex).reserved_float_registers, 3);
        assert_eq!(config.limits(ShaderStage::Vertex).sampler_registers, 0);
    }

    #[test]
    fn env_rejects_bad_values() {
        let vars = HashMap::from([(SHADER_MODEL_ENV, "4")]);
        let err = LinkConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv(SHADER_MODEL_ENV)));

        let vars = HashMap::from([(RESERVED_PS_ENV, "225")]);
        let err = LinkConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv(RESERVED_PS_ENV)));

        let vars = HashMap::from([(RESERVED_VS_ENV, "lots")]);
        assert!(LinkConfig::from_lookup(lookup_from(&vars)).is_err());
    }
}
