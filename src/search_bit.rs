//! Set algebra over matched document ordinals.
//!
//! Filters computed independently (one query per facet, say) are combined
//! as bitsets before or after a relevance query. Operations never mutate
//! their operands: the left operand is cloned and the clone is combined
//! with the right one.

use std::{any::Any, fmt};

use roaring::RoaringBitmap;

use crate::error::{Error, Result};

/// An immutable set of document ordinals.
pub trait SearchBit: fmt::Debug + Send + Sync {
    fn and(&self, other: &dyn SearchBit) -> Result<Box<dyn SearchBit>>;

    fn or(&self, other: &dyn SearchBit) -> Result<Box<dyn SearchBit>>;

    fn xor(&self, other: &dyn SearchBit) -> Result<Box<dyn SearchBit>>;

    /// Number of ordinals in the set.
    fn count(&self) -> u64;

    fn contains(&self, ordinal: u32) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// [`SearchBit`] backed by a compressed roaring bitmap.
#[derive(Clone, Default, PartialEq)]
pub struct DocBitSet {
    bits: RoaringBitmap,
}

impl DocBitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bitmap(bits: RoaringBitmap) -> Self {
        Self { bits }
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Ordinals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }

    fn combine(
        &self,
        other: &dyn SearchBit,
        op: &str,
        apply: impl FnOnce(&mut RoaringBitmap, &RoaringBitmap),
    ) -> Result<Box<dyn SearchBit>> {
        let other = other.as_any().downcast_ref::<Self>().ok_or_else(|| {
            Error::InvalidOperation(format!(
                "cannot {op} a DocBitSet with a different bitset implementation"
            ))
        })?;

        let mut bits = self.bits.clone();
        apply(&mut bits, &other.bits);
        Ok(Box::new(Self { bits }))
    }
}

impl FromIterator<u32> for DocBitSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            bits: iter.into_iter().collect(),
        }
    }
}

impl SearchBit for DocBitSet {
    fn and(&self, other: &dyn SearchBit) -> Result<Box<dyn SearchBit>> {
        self.combine(other, "and", |left, right| *left &= right)
    }

    fn or(&self, other: &dyn SearchBit) -> Result<Box<dyn SearchBit>> {
        self.combine(other, "or", |left, right| *left |= right)
    }

    fn xor(&self, other: &dyn SearchBit) -> Result<Box<dyn SearchBit>> {
        self.combine(other, "xor", |left, right| *left ^= right)
    }

    fn count(&self) -> u64 {
        self.bits.len()
    }

    fn contains(&self, ordinal: u32) -> bool {
        self.bits.contains(ordinal)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for DocBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bits.iter()).finish()
    }
}
