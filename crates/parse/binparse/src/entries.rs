//! Errors of the record iterators generated by `#[derive(TableEntries)]`.

use core::fmt;

/// Why a type-length record stream could not be walked any further.
///
/// Offsets are relative to the start of the slice given to the iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryError {
    /// The record's length byte is smaller than its two-byte header, or than
    /// the fixed size of its known type. The walk cannot find the next record.
    Malformed {
        /// Offset of the record.
        offset: usize,
        /// The declared record length.
        length: u8,
    },
    /// The record header or the record body extends past the end of the
    /// region.
    Truncated {
        /// Offset of the record.
        offset: usize,
        /// Bytes left in the region at `offset`.
        remaining: usize,
    },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { offset, length } => {
                write!(f, "record at {offset:#x} has invalid length {length}")
            }
            Self::Truncated { offset, remaining } => write!(
                f,
                "record at {offset:#x} does not fit in the {remaining} remaining bytes"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableEntries;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, TableEntries)]
    pub enum Record {
        #[entry(type_id = 1, min_length = 4)]
        Short {
            #[field(offset = 2)]
            value: u16,
        },
        #[entry(type_id = 2, min_length = 8)]
        Wide {
            #[field(offset = 2)]
            tag: u8,
            #[field(offset = 4)]
            value: u32,
        },
        #[fallback]
        Other { entry_type: u8, length: u8 },
    }

    fn collect(data: &[u8]) -> Vec<Result<Record, EntryError>> {
        Record::iter(data).collect()
    }

    #[test]
    fn records_decode_in_order() {
        let data = [
            1, 4, 0x34, 0x12, //
            9, 3, 0xaa, //
            2, 8, 7, 0, 0x78, 0x56, 0x34, 0x12,
        ];
        assert_eq!(
            collect(&data),
            vec![
                Ok(Record::Short { value: 0x1234 }),
                Ok(Record::Other {
                    entry_type: 9,
                    length: 3,
                }),
                Ok(Record::Wide {
                    tag: 7,
                    value: 0x1234_5678,
                }),
            ]
        );
    }

    #[test]
    fn longer_records_skip_their_tail() {
        let data = [1, 6, 1, 0, 0xff, 0xff, 1, 4, 2, 0];
        assert_eq!(
            collect(&data),
            vec![Ok(Record::Short { value: 1 }), Ok(Record::Short { value: 2 })]
        );
    }

    #[test]
    fn zero_and_undersized_lengths_are_malformed() {
        assert_eq!(
            collect(&[1, 4, 0, 0, 5, 0, 1, 4, 0, 0]),
            vec![
                Ok(Record::Short { value: 0 }),
                Err(EntryError::Malformed {
                    offset: 4,
                    length: 0,
                }),
            ]
        );
        assert_eq!(
            collect(&[2, 6, 0, 0, 0, 0]),
            vec![Err(EntryError::Malformed {
                offset: 0,
                length: 6,
            })]
        );
        assert_eq!(
            collect(&[9, 1]),
            vec![Err(EntryError::Malformed {
                offset: 0,
                length: 1,
            })]
        );
    }

    #[test]
    fn records_past_the_end_are_truncated() {
        assert_eq!(
            collect(&[1, 4, 0, 0, 9, 16, 0, 0]),
            vec![
                Ok(Record::Short { value: 0 }),
                Err(EntryError::Truncated {
                    offset: 4,
                    remaining: 4,
                }),
            ]
        );
        assert_eq!(
            collect(&[1, 4, 0, 0, 9]),
            vec![
                Ok(Record::Short { value: 0 }),
                Err(EntryError::Truncated {
                    offset: 4,
                    remaining: 1,
                }),
            ]
        );
    }

    #[test]
    fn empty_region_has_no_records() {
        assert_eq!(Record::iter(&[]).count(), 0);
    }
}
