//! Temporary allocations inside a filter module's linear memory

/// A `(pointer, length)` allocation obtained from the module allocator.
///
/// Not `Clone` or `Copy`: releasing a region consumes it, so a region
/// cannot be released twice or used after release.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a memory region must be released back to the module"]
pub struct MemoryRegion {
    ptr: u32,
    len: u32,
}

impl MemoryRegion {
    pub fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset one past the end of the region.
    pub fn end(&self) -> u64 {
        self.ptr as u64 + self.len as u64
    }

    /// Consume the region, yielding the pointer to hand back to `free`.
    pub fn into_ptr(self) -> u32 {
        self.ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_does_not_overflow() {
        let region = MemoryRegion::new(u32::MAX, 8);
        assert_eq!(region.end(), u32::MAX as u64 + 8);
        assert_eq!(region.into_ptr(), u32::MAX);
    }
}
