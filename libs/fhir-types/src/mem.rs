//! Heap footprint estimates.
//!
//! Sizes count the heap allocations a value owns exclusively. Pooled values
//! count zero, since every holder shares them.

use std::mem::size_of;

/// Strong and weak counters in front of every `Arc` allocation.
pub const ARC_HEADER: usize = 2 * size_of::<usize>();

const ALIGN: usize = 8;

pub const fn padded(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

/// Size of an `Arc<T>` allocation.
pub const fn arc_size<T>() -> usize {
    padded(ARC_HEADER + size_of::<T>())
}

/// Size of an `Arc<str>` allocation.
pub fn str_size(s: &str) -> usize {
    padded(ARC_HEADER + s.len())
}

/// Size of an `Arc<[T]>` allocation, element heap excluded.
pub fn slice_size<T>(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        padded(ARC_HEADER + len * size_of::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded() {
        assert_eq!(padded(0), 0);
        assert_eq!(padded(1), 8);
        assert_eq!(padded(8), 8);
        assert_eq!(padded(17), 24);
    }

    #[test]
    fn test_str_size_grows_with_length() {
        assert!(str_size("a") < str_size(&"a".repeat(64)));
        assert_eq!(str_size(""), padded(ARC_HEADER));
    }

    #[test]
    fn test_empty_slice_is_free() {
        assert_eq!(slice_size::<u64>(0), 0);
        assert_eq!(slice_size::<u64>(2), padded(ARC_HEADER + 16));
    }
}
