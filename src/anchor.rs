use crate::math::Float3;

/// Track state at the start of a section.
///
/// Anchor nodes own one of these; downstream sections read it to continue
/// position, orientation and physics smoothly. The document stores it
/// verbatim and never simulates from it.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnchorPoint {
    pub heart_position: Float3,
    pub direction: Float3,
    pub normal: Float3,
    pub lateral: Float3,
    pub velocity: f32,
    pub normal_force: f32,
    pub lateral_force: f32,
    pub heart_arc: f32,
    pub spine_arc: f32,
    pub heart_advance: f32,
    pub friction_origin: f32,
    pub roll_speed: f32,
    pub heart_offset: f32,
    pub friction: f32,
    pub resistance: f32,
}

impl AnchorPoint {
    /// Number of f32 values in the wire layout (4 vectors + 11 scalars).
    pub const FLOAT_COUNT: usize = 4 * 3 + 11;

    /// Level track at rest at `position`, facing forward.
    pub fn at(heart_position: Float3) -> Self {
        Self {
            heart_position,
            ..Self::default()
        }
    }
}

impl Default for AnchorPoint {
    fn default() -> Self {
        Self {
            heart_position: Float3::ZERO,
            direction: Float3::BACK,
            normal: Float3::new(0.0, -1.0, 0.0),
            lateral: Float3::RIGHT,
            velocity: 10.0,
            normal_force: 1.0,
            lateral_force: 0.0,
            heart_arc: 0.0,
            spine_arc: 0.0,
            heart_advance: 0.0,
            friction_origin: 0.0,
            roll_speed: 0.0,
            heart_offset: 1.1,
            friction: 0.0,
            resistance: 0.0,
        }
    }
}
