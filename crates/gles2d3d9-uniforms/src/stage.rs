use std::fmt;

use bitflags::bitflags;

/// Shader stages that own a constant register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Pixel];

    pub const fn flag(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::Pixel => ShaderStageFlags::PIXEL,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vs"),
            Self::Pixel => f.write_str("ps"),
        }
    }
}

bitflags! {
    /// Set of stages a uniform has registers bound in.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u8 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
    }
}

/// One value per shader stage, indexed by [`ShaderStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerStage<T> {
    pub vertex: T,
    pub pixel: T,
}

impl<T> PerStage<T> {
    pub const fn new(vertex: T, pixel: T) -> Self {
        Self { vertex, pixel }
    }

    pub fn get(&self, stage: ShaderStage) -> &T {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Pixel => &self.pixel,
        }
    }

    pub fn get_mut(&mut self, stage: ShaderStage) -> &mut T {
        match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Pixel => &mut self.pixel,
        }
    }
}
