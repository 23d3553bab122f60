//! Animation curves attached to node properties.
//!
//! A track is an ascending-by-time run of [`Keyframe`]s; [`KeyframeStore`]
//! packs every track of a document into one flat array addressed by
//! `(node_id, property_id)` ranges.

mod store;

pub use store::{keyframe_key, InvalidRange, KeyframeStore};

use crate::anchor::AnchorPoint;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterpolationType {
    Constant = 0,
    Linear = 1,
    Bezier = 2,
}

impl InterpolationType {
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Unknown bytes decode as Bezier, the richest mode.
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Constant,
            1 => Self::Linear,
            _ => Self::Bezier,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_interpolation: InterpolationType,
    pub out_interpolation: InterpolationType,
    pub in_tangent: f32,
    pub out_tangent: f32,
    pub in_weight: f32,
    pub out_weight: f32,
}

impl Keyframe {
    /// Size of one keyframe record on the wire.
    pub const ENCODED_SIZE: usize = 4 + 4 + 1 + 1 + 4 * 4;

    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        time: f32,
        value: f32,
        in_interpolation: InterpolationType,
        out_interpolation: InterpolationType,
        in_tangent: f32,
        out_tangent: f32,
        in_weight: f32,
        out_weight: f32,
    ) -> Self {
        Self {
            time,
            value,
            in_interpolation,
            out_interpolation,
            in_tangent,
            out_tangent,
            in_weight,
            out_weight,
        }
    }

    /// Flat-tangent Bezier keyframe with one-third weights.
    pub const fn simple(time: f32, value: f32) -> Self {
        Self::new(
            time,
            value,
            InterpolationType::Bezier,
            InterpolationType::Bezier,
            0.0,
            0.0,
            1.0 / 3.0,
            1.0 / 3.0,
        )
    }

    pub const fn linear(time: f32, value: f32) -> Self {
        Self::new(
            time,
            value,
            InterpolationType::Linear,
            InterpolationType::Linear,
            0.0,
            0.0,
            1.0 / 3.0,
            1.0 / 3.0,
        )
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PropertyId {
    RollSpeed = 0,
    NormalForce = 1,
    LateralForce = 2,
    PitchSpeed = 3,
    YawSpeed = 4,
    DrivenVelocity = 5,
    HeartOffset = 6,
    Friction = 7,
    Resistance = 8,
    TrackStyle = 9,
}

impl PropertyId {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PropertyId::RollSpeed),
            1 => Some(PropertyId::NormalForce),
            2 => Some(PropertyId::LateralForce),
            3 => Some(PropertyId::PitchSpeed),
            4 => Some(PropertyId::YawSpeed),
            5 => Some(PropertyId::DrivenVelocity),
            6 => Some(PropertyId::HeartOffset),
            7 => Some(PropertyId::Friction),
            8 => Some(PropertyId::Resistance),
            9 => Some(PropertyId::TrackStyle),
            _ => None,
        }
    }

    /// Value of an empty track for properties that do not continue from
    /// the upstream anchor.
    pub const fn default_value(self) -> f32 {
        match self {
            PropertyId::NormalForce => 1.0,
            _ => 0.0,
        }
    }

    /// Upstream value an empty track continues from, if this property
    /// carries over between sections.
    pub fn anchor_value(self, anchor: &AnchorPoint) -> Option<f32> {
        match self {
            PropertyId::DrivenVelocity => Some(anchor.velocity),
            PropertyId::HeartOffset => Some(anchor.heart_offset),
            PropertyId::Friction => Some(anchor.friction),
            PropertyId::Resistance => Some(anchor.resistance),
            _ => None,
        }
    }
}

/// Evaluate a property track, falling back to the anchor-carried value or
/// the property default when the track is empty.
pub fn evaluate_property(
    keyframes: &[Keyframe],
    property: PropertyId,
    t: f32,
    anchor: Option<&AnchorPoint>,
) -> f32 {
    let default_value = anchor
        .and_then(|a| property.anchor_value(a))
        .unwrap_or(property.default_value());
    evaluate(keyframes, t, default_value)
}

pub fn evaluate(keyframes: &[Keyframe], t: f32, default_value: f32) -> f32 {
    if keyframes.is_empty() {
        return default_value;
    }
    if t <= keyframes[0].time {
        return keyframes[0].value;
    }

    let last = keyframes.len() - 1;
    if t >= keyframes[last].time {
        return keyframes[last].value;
    }

    let i = keyframes
        .partition_point(|kf| kf.time <= t)
        .saturating_sub(1);
    // NaN times fall through both clamps above.
    if i >= last {
        return keyframes[last].value;
    }

    let start = keyframes[i];
    let end = keyframes[i + 1];
    evaluate_segment(&start, &end, t)
}

pub fn evaluate_segment(start: &Keyframe, end: &Keyframe, t: f32) -> f32 {
    if start.out_interpolation == InterpolationType::Constant
        || end.in_interpolation == InterpolationType::Constant
    {
        return start.value;
    }

    let dt = end.time - start.time;
    if dt <= 0.0 {
        return start.value;
    }

    match start.out_interpolation.max(end.in_interpolation) {
        InterpolationType::Linear => {
            let segment_t = (t - start.time) / dt;
            start.value + (end.value - start.value) * segment_t
        }
        InterpolationType::Bezier => evaluate_bezier_2d(start, end, t),
        InterpolationType::Constant => start.value,
    }
}

/// Cubic Bezier through (time, value) control points. Time is itself
/// parametric, so solve u for `target_time` by Newton-Raphson first, then
/// evaluate the value axis at u.
fn evaluate_bezier_2d(start: &Keyframe, end: &Keyframe, target_time: f32) -> f32 {
    let dt = end.time - start.time;

    let p0_x = start.time;
    let p0_y = start.value;
    let p1_x = start.time + (dt * start.out_weight);
    let p1_y = start.value + (start.out_tangent * dt * start.out_weight);
    let p2_x = end.time - (dt * end.in_weight);
    let p2_y = end.value - (end.in_tangent * dt * end.in_weight);
    let p3_x = end.time;
    let p3_y = end.value;

    let mut u = (target_time - start.time) / dt;
    for _ in 0..8 {
        let one_minus_u = 1.0 - u;
        let one_minus_u2 = one_minus_u * one_minus_u;
        let one_minus_u3 = one_minus_u2 * one_minus_u;
        let u2 = u * u;
        let u3 = u2 * u;

        let bezier_time = one_minus_u3 * p0_x
            + 3.0 * one_minus_u2 * u * p1_x
            + 3.0 * one_minus_u * u2 * p2_x
            + u3 * p3_x;

        let time_diff = bezier_time - target_time;
        if time_diff.abs() < 1e-6 {
            break;
        }

        let bezier_time_derivative = 3.0 * one_minus_u2 * (p1_x - p0_x)
            + 6.0 * one_minus_u * u * (p2_x - p1_x)
            + 3.0 * u2 * (p3_x - p2_x);

        if bezier_time_derivative.abs() < 1e-9 {
            break;
        }

        u -= time_diff / bezier_time_derivative;
        u = u.clamp(0.0, 1.0);
    }

    let one_minus_u = 1.0 - u;
    let one_minus_u2 = one_minus_u * one_minus_u;
    let one_minus_u3 = one_minus_u2 * one_minus_u;
    let u2 = u * u;
    let u3 = u2 * u;

    one_minus_u3 * p0_y + 3.0 * one_minus_u2 * u * p1_y + 3.0 * one_minus_u * u2 * p2_y + u3 * p3_y
}
