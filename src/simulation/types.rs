use bytemuck::{Pod, Zeroable};

// Constants for simulation
pub(crate) const DEFAULT_PARTICLE_COUNT: u32 = 500;
pub(crate) const COMPUTE_WORKGROUP_SIZE: u32 = 64;
pub(crate) const IMAGE_WORKGROUP_SIZE: u32 = 8;

// Particle flags, mirrored in shaders/particle.wgsl
pub(crate) const PARTICLE_FIXED: i32 = 1 << 0;
pub(crate) const PARTICLE_ATTRACTOR: i32 = 1 << 1;
pub(crate) const PARTICLE_CRUNCHER: i32 = 1 << 2;

pub(crate) const PARTICLE_KIND_DEFAULT: i32 = 1;

/// A single mass point, laid out exactly like `Particle` in `shaders/particle.wgsl`.
///
/// | offset | field      |
/// |-------:|------------|
/// | 0      | `kind`     |
/// | 4      | `mass`     |
/// | 8      | `density`  |
/// | 16     | `position` |
/// | 24     | `velocity` |
/// | 32     | `flags`    |
///
/// The two padding words keep `position` on an 8 byte boundary and the record
/// size a multiple of 8, as WGSL storage layout rules require for `vec2<f32>`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct Particle {
    pub kind: i32,
    pub mass: f32,
    pub density: f32,
    pub _pad1: i32,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub flags: i32,
    pub _pad2: i32,
}

impl Particle {
    pub(crate) fn has_flag(&self, flag: i32) -> bool {
        self.flags & flag != 0
    }

    pub(crate) fn is_fixed(&self) -> bool {
        self.has_flag(PARTICLE_FIXED)
    }

    /// Visual and collision radius in world units.
    pub(crate) fn radius(&self) -> f32 {
        (self.mass / self.density).sqrt()
    }
}

// Uniforms bound once at setup, mirrored in shaders/kernel.wgsl
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct ImageParams {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct SimulationParams {
    pub count: u32,
    pub step_width: f32,
    pub _padding: [u32; 2],
}

// The only uniform rewritten every frame
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct ViewParams {
    pub zoom: f32,
    pub _padding: [f32; 3],
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;

    #[test]
    fn particle_layout_matches_kernel_struct() {
        assert_eq!(size_of::<Particle>(), 40);
        assert_eq!(offset_of!(Particle, kind), 0);
        assert_eq!(offset_of!(Particle, mass), 4);
        assert_eq!(offset_of!(Particle, density), 8);
        assert_eq!(offset_of!(Particle, position), 16);
        assert_eq!(offset_of!(Particle, velocity), 24);
        assert_eq!(offset_of!(Particle, flags), 32);
    }

    #[test]
    fn uniforms_are_sixteen_bytes() {
        assert_eq!(size_of::<ImageParams>(), 16);
        assert_eq!(size_of::<SimulationParams>(), 16);
        assert_eq!(size_of::<ViewParams>(), 16);
    }

    #[test]
    fn radius_follows_mass_and_density() {
        let particle = Particle {
            kind: PARTICLE_KIND_DEFAULT,
            mass: 160.0,
            density: 10.0,
            flags: PARTICLE_ATTRACTOR,
            ..Particle::zeroed()
        };
        assert_eq!(particle.radius(), 4.0);
        assert!(particle.has_flag(PARTICLE_ATTRACTOR));
        assert!(!particle.is_fixed());
    }
}
