//! Reasons why an allocation request could not be served

use std::fmt;


/// Allocation failure
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AllocError {
    /// Zero-sized ranges cannot be reserved
    ZeroSize,

    /// Sizes cannot be rounded up to a multiple of zero
    ZeroAlignment,

    /// Every node slot is in use, the allocator cannot track one more range
    OutOfNodes,

    /// The request is larger than the total free space
    OutOfSpace {
        /// Requested size
        requested: u32,

        /// Total free space at the time of the request
        free: u32,
    },

    /// There is enough free space in total, but no free range is large enough
    NoFittingBin {
        /// Requested size
        requested: u32,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AllocError::ZeroSize => write!(f, "cannot allocate zero offsets"),
            AllocError::ZeroAlignment => write!(f, "alignment must not be zero"),
            AllocError::OutOfNodes => write!(f, "allocation count limit reached"),
            AllocError::OutOfSpace { requested, free } => write!(
                f,
                "requested {} offsets but only {} are free",
                requested, free
            ),
            AllocError::NoFittingBin { requested } => write!(
                f,
                "no free range can hold {} offsets (fragmentation)",
                requested
            ),
        }
    }
}

impl std::error::Error for AllocError {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(AllocError::ZeroSize.to_string(), "cannot allocate zero offsets");
        assert_eq!(AllocError::ZeroAlignment.to_string(), "alignment must not be zero");
        assert_eq!(
            AllocError::OutOfSpace { requested: 10, free: 4 }.to_string(),
            "requested 10 offsets but only 4 are free"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(AllocError::OutOfNodes);
        assert_eq!(boxed.to_string(), "allocation count limit reached");
        assert_eq!(
            AllocError::NoFittingBin { requested: 25 }.to_string(),
            "no free range can hold 25 offsets (fragmentation)"
        );
    }
}
