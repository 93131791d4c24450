#![forbid(unsafe_code)]

//! Typed byte-range annotations ("runs") laid over a model.

use crate::Address;

/// What a run says about the bytes it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFormat {
    /// Placeholder that carries no information beyond "something starts here".
    NoInfo,
    /// A 4-byte pointer. `destination` is `None` while the target is unknown.
    Pointer { destination: Option<Address> },
    /// A table of `element_count` elements, each `element_length` bytes.
    Table {
        element_count: usize,
        element_length: usize,
    },
    /// Encoded text.
    Text,
    /// A count field mirroring the element count of the table named `parent`.
    MatchedWord { parent: String },
}

/// An annotation covering `length` bytes starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    start: Address,
    length: usize,
    format: RunFormat,
}

impl Run {
    /// Create a run.
    #[must_use]
    pub fn new(start: Address, length: usize, format: RunFormat) -> Self {
        Self {
            start,
            length,
            format,
        }
    }

    /// Create a zero-length placeholder run.
    #[must_use]
    pub fn no_info(start: Address) -> Self {
        Self::new(start, 0, RunFormat::NoInfo)
    }

    /// Create a table run; its length is derived from the element shape.
    #[must_use]
    pub fn table(start: Address, element_count: usize, element_length: usize) -> Self {
        Self::new(
            start,
            element_count * element_length,
            RunFormat::Table {
                element_count,
                element_length,
            },
        )
    }

    /// Create a 4-byte pointer run.
    #[must_use]
    pub fn pointer(start: Address, destination: Option<Address>) -> Self {
        Self::new(start, 4, RunFormat::Pointer { destination })
    }

    #[must_use]
    pub const fn start(&self) -> Address {
        self.start
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// One past the last covered address.
    #[must_use]
    pub const fn end(&self) -> Address {
        self.start + self.length
    }

    #[must_use]
    pub fn format(&self) -> &RunFormat {
        &self.format
    }

    /// Whether this is a [`RunFormat::NoInfo`] placeholder.
    #[must_use]
    pub fn is_no_info(&self) -> bool {
        matches!(self.format, RunFormat::NoInfo)
    }

    /// Element count for table runs, `None` for every other format.
    #[must_use]
    pub fn element_count(&self) -> Option<usize> {
        match self.format {
            RunFormat::Table { element_count, .. } => Some(element_count),
            _ => None,
        }
    }

    /// Whether `address` falls inside this run. Zero-length runs contain
    /// only their start.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        address == self.start || (address > self.start && address < self.end())
    }

    /// The same run relocated to `start`.
    #[must_use]
    pub fn moved_to(&self, start: Address) -> Self {
        Self {
            start,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_length_follows_shape() {
        let run = Run::table(0x100, 12, 4);
        assert_eq!(run.len(), 48);
        assert_eq!(run.end(), 0x130);
        assert_eq!(run.element_count(), Some(12));
    }

    #[test]
    fn only_tables_report_element_count() {
        assert_eq!(Run::pointer(0, Some(8)).element_count(), None);
        assert_eq!(Run::no_info(0).element_count(), None);
        assert_eq!(Run::new(0, 3, RunFormat::Text).element_count(), None);
    }

    #[test]
    fn contains_respects_bounds() {
        let run = Run::pointer(0x20, None);
        assert!(run.contains(0x20));
        assert!(run.contains(0x23));
        assert!(!run.contains(0x24));
        assert!(!run.contains(0x1F));

        let placeholder = Run::no_info(0x40);
        assert!(placeholder.contains(0x40));
        assert!(!placeholder.contains(0x41));
    }

    #[test]
    fn moved_to_keeps_format() {
        let run = Run::table(0x10, 2, 2).moved_to(0x80);
        assert_eq!(run.start(), 0x80);
        assert_eq!(run.element_count(), Some(2));
    }
}
