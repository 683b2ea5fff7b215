//! NDR encoding/decoding context
//!
//! The context selects the transfer syntax and carries the limits the reader
//! enforces on sizes received from the peer.

/// Transfer syntax negotiated for a presentation context.
///
/// Both syntaxes are little-endian. They differ in the width of pointer
/// markers and array size words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferSyntax {
    /// NDR 2.0: 4-byte pointers and size words
    #[default]
    Ndr20,
    /// NDR64: 8-byte pointers and size words
    Ndr64,
}

impl TransferSyntax {
    /// Width in bytes of a pointer marker or size word
    #[inline]
    pub fn pointer_size(self) -> usize {
        match self {
            TransferSyntax::Ndr20 => 4,
            TransferSyntax::Ndr64 => 8,
        }
    }
}

/// Default cap on a single decoded element count
pub const DEFAULT_MAX_ELEMENTS: u64 = 16 * 1024 * 1024;

/// NDR encoding/decoding context
#[derive(Debug, Clone, Copy)]
pub struct NdrContext {
    pub syntax: TransferSyntax,
    /// Largest size word the reader accepts before checking the buffer
    pub max_elements: u64,
}

impl NdrContext {
    /// NDR 2.0 with default limits
    pub fn new() -> Self {
        Self {
            syntax: TransferSyntax::Ndr20,
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }

    /// NDR64 with default limits
    pub fn ndr64() -> Self {
        Self {
            syntax: TransferSyntax::Ndr64,
            ..Self::new()
        }
    }

    pub fn with_syntax(syntax: TransferSyntax) -> Self {
        Self {
            syntax,
            ..Self::new()
        }
    }

    pub fn with_max_elements(mut self, max_elements: u64) -> Self {
        self.max_elements = max_elements;
        self
    }

    /// Calculate padding needed to align to the given boundary
    #[inline]
    pub fn align_padding(position: usize, alignment: usize) -> usize {
        if alignment <= 1 {
            return 0;
        }
        let remainder = position % alignment;
        if remainder == 0 {
            0
        } else {
            alignment - remainder
        }
    }
}

impl Default for NdrContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_padding() {
        assert_eq!(NdrContext::align_padding(0, 4), 0);
        assert_eq!(NdrContext::align_padding(1, 4), 3);
        assert_eq!(NdrContext::align_padding(2, 4), 2);
        assert_eq!(NdrContext::align_padding(3, 4), 1);
        assert_eq!(NdrContext::align_padding(4, 4), 0);
        assert_eq!(NdrContext::align_padding(5, 8), 3);
        assert_eq!(NdrContext::align_padding(7, 1), 0);
        assert_eq!(NdrContext::align_padding(7, 0), 0);
    }

    #[test]
    fn test_pointer_size() {
        assert_eq!(NdrContext::new().syntax.pointer_size(), 4);
        assert_eq!(NdrContext::ndr64().syntax.pointer_size(), 8);
    }
}
