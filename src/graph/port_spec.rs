use crate::math::Float3;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PortDataType {
    Scalar = 0,
    Vector = 1,
    Anchor = 2,
    Path = 3,
}

impl PortDataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Scalar),
            1 => Some(Self::Vector),
            2 => Some(Self::Anchor),
            3 => Some(Self::Path),
            _ => None,
        }
    }

    /// Bytes an unconnected input of this type contributes to the keyed maps.
    /// Anchor and path ports carry no inline value; they are fed by edges.
    pub const fn value_width(self) -> usize {
        match self {
            Self::Scalar => 4,
            Self::Vector => 12,
            Self::Anchor | Self::Path => 0,
        }
    }

    pub const fn has_inline_value(self) -> bool {
        self.value_width() > 0
    }
}

/// Inline value held by a port, tagged by the port's data type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PortValue {
    Scalar(f32),
    Vector(Float3),
    Anchor,
    Path,
}

impl PortValue {
    pub const fn data_type(&self) -> PortDataType {
        match self {
            Self::Scalar(_) => PortDataType::Scalar,
            Self::Vector(_) => PortDataType::Vector,
            Self::Anchor => PortDataType::Anchor,
            Self::Path => PortDataType::Path,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PortSpec {
    pub data_type: PortDataType,
    pub local_index: u8,
}

impl PortSpec {
    pub const fn new(data_type: PortDataType, local_index: u8) -> Self {
        Self {
            data_type,
            local_index,
        }
    }

    /// Encode to u32: (DataType << 8) | LocalIndex
    pub const fn to_encoded(&self) -> u32 {
        ((self.data_type as u32) << 8) | (self.local_index as u32)
    }

    /// Decode from u32. Returns `None` for an unknown data type byte.
    pub fn try_from_encoded(encoded: u32) -> Option<Self> {
        let data_type = PortDataType::from_u8((encoded >> 8) as u8)?;
        Some(Self {
            data_type,
            local_index: (encoded & 0xFF) as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_spec_anchor_encodes_correctly() {
        let spec = PortSpec::new(PortDataType::Anchor, 0);
        // Anchor = 2, LocalIndex = 0 -> (2 << 8) | 0 = 512
        assert_eq!(spec.to_encoded(), 512);
        assert_eq!(PortSpec::try_from_encoded(512), Some(spec));
    }

    #[test]
    fn port_spec_scalar_with_index_encodes_correctly() {
        let spec = PortSpec::new(PortDataType::Scalar, 2);
        assert_eq!(spec.to_encoded(), 2);
    }

    #[test]
    fn unknown_data_type_does_not_decode() {
        assert_eq!(PortSpec::try_from_encoded(9 << 8), None);
    }

    #[test]
    fn value_width_per_type() {
        assert_eq!(PortDataType::Scalar.value_width(), 4);
        assert_eq!(PortDataType::Vector.value_width(), 12);
        assert!(!PortDataType::Anchor.has_inline_value());
        assert!(!PortDataType::Path.has_inline_value());
    }

    #[test]
    fn port_value_reports_its_type() {
        assert_eq!(PortValue::Scalar(1.0).data_type(), PortDataType::Scalar);
        assert_eq!(
            PortValue::Vector(Float3::ZERO).data_type(),
            PortDataType::Vector
        );
        assert_eq!(PortValue::Path.data_type(), PortDataType::Path);
    }
}
