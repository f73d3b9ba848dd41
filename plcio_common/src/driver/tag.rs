//! Tags: typed addresses bound to a driver connection.

use crate::driver::api::ConnectionId;
use crate::process::{ProcessAddress, ProcessArea, ValueType};
use std::fmt;

/// A typed process image location on one driver connection.
///
/// Tags carry no engineering semantics (units, scaling, names); they only
/// route an access to a driver and fix the value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Driver connection serving this tag
    pub connection_id: ConnectionId,
    /// Location inside the driver's process image
    pub address: ProcessAddress,
    /// Value type stored at `address`
    pub value_type: ValueType,
}

impl Tag {
    /// Create a tag.
    pub const fn new(connection_id: ConnectionId, address: ProcessAddress, value_type: ValueType) -> Self {
        Self {
            connection_id,
            address,
            value_type,
        }
    }

    /// Bit tag at `area[byte].bit`.
    pub const fn bit(connection_id: ConnectionId, area: ProcessArea, byte: usize, bit: u8) -> Self {
        Self::new(connection_id, ProcessAddress::new(area, byte, bit), ValueType::Bit)
    }

    /// Non-bit tag of `value_type` at `area[byte]`.
    pub const fn at(connection_id: ConnectionId, area: ProcessArea, byte: usize, value_type: ValueType) -> Self {
        Self::new(connection_id, ProcessAddress::at_byte(area, byte), value_type)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.connection_id, self.address, self.value_type)
    }
}
