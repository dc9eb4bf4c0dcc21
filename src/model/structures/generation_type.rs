use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter};

/// How a story entered its current generation
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[repr(u8)]
pub enum GenerationType {
    /// Fresh member of generation 0
    Initial = 0,
    /// Generated from a parent of the previous generation
    Variant = 1,
    /// Survivor carried over from the previous generation
    Promoted = 2
}

impl TryFrom<i32> for GenerationType {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(GenerationType::Initial),
            1 => Ok(GenerationType::Variant),
            2 => Ok(GenerationType::Promoted),
            _ => Err(())
        }
    }
}
