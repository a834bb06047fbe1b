//! Little-endian codec for attribute value contents.
//!
//! The ATT PDU codec proper lives below this crate, in the transport; what
//! remains here is just enough to pick apart the attribute *values* the
//! peer hands back (characteristic declarations, include definitions,
//! length-prefixed read-multiple records) and to pack notification batches.

pub trait FixedSize: Sized {
    const SIZE: usize;
}

pub trait Type: Sized {
    fn size(&self) -> usize;
}

pub trait Encode: Type {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error>;
}

pub trait Decode<'d>: Type {
    fn decode(src: &'d [u8]) -> Result<Self, Error>;
}

impl<T: FixedSize> Type for T {
    fn size(&self) -> usize {
        Self::SIZE
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    InsufficientSpace,
    InvalidValue,
}
