use bitflags::bitflags;

bitflags! {
    /// Selects which parts of the tracked delta `diff` materializes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DiffFilter: u8 {
        const DATA = 1 << 0;
        const ATTRIBUTE = 1 << 1;
        const CUSTOM = 1 << 2;
        const PROPERTY = Self::DATA.bits() | Self::ATTRIBUTE.bits() | Self::CUSTOM.bits();
        const MUTATED = 1 << 3;
        const ORIGINAL = 1 << 4;
        const CHILDREN = Self::MUTATED.bits() | Self::ORIGINAL.bits();
        const ALL = Self::PROPERTY.bits() | Self::CHILDREN.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_bits_cover_their_parts() {
        assert!(DiffFilter::PROPERTY.contains(DiffFilter::DATA));
        assert!(DiffFilter::PROPERTY.contains(DiffFilter::ATTRIBUTE));
        assert!(DiffFilter::PROPERTY.contains(DiffFilter::CUSTOM));
        assert!(DiffFilter::CHILDREN.contains(DiffFilter::MUTATED | DiffFilter::ORIGINAL));
        assert_eq!(DiffFilter::ALL, DiffFilter::PROPERTY | DiffFilter::CHILDREN);
        assert!(!DiffFilter::CHILDREN.intersects(DiffFilter::PROPERTY));
    }
}
