//! Codec Tests - NDR encoding of composite parameter structures
//!
//! These tests exercise the wire codec the way generated stubs use it:
//! - Conformant structures whose bounds precede their fixed fields
//! - Arrays of structures with embedded pointers
//! - Both transfer syntaxes
//! - Truncated and corrupt input

mod common;

use common::*;
use midl_ndr::{
    from_bytes, read_elements, to_bytes, write_elements, write_sizes, ConformantArray,
    NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader, NdrString, NdrWString, NdrWriter,
    PointerKind, SizeContext, UniquePtr,
};

/// `struct { long count; [unique] char *tag; [size_is(count)] short values[]; }`
#[derive(Debug, Clone, PartialEq)]
struct Samples {
    count: u32,
    tag: UniquePtr<NdrString>,
    values: Vec<i16>,
}

impl NdrEncode for Samples {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        write_sizes(w, &[self.count as u64])?;
        w.write_align(4);
        w.write_data(self.count);
        self.tag.ndr_encode(w)?;
        write_elements(w, &self.values, self.count as u64)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Samples {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        let mut sizes = SizeContext::new();
        sizes.read_prefix(r, 1)?;
        r.read_align(4);
        let count = r.read_data()?;
        let tag = UniquePtr::ndr_decode(r)?;
        let values = read_elements(r, &sizes, 1, |r| r.read_data())?;
        Ok(Self { count, tag, values })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// `struct { long id; [unique] wchar_t *label; }`
#[derive(Debug, Clone, PartialEq, Default)]
struct Item {
    id: u32,
    label: UniquePtr<NdrWString>,
}

impl NdrEncode for Item {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_align(4);
        w.write_data(self.id);
        self.label.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Item {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.read_align(4);
        Ok(Self {
            id: r.read_data()?,
            label: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

fn samples() -> Samples {
    Samples {
        count: 3,
        tag: UniquePtr::new(NdrString::new("temp")),
        values: vec![-1, 20, 300],
    }
}

fn items() -> ConformantArray<Item> {
    ConformantArray::new(vec![
        Item {
            id: 1,
            label: UniquePtr::new(NdrWString::new("a")),
        },
        Item {
            id: 2,
            label: UniquePtr::null(),
        },
        Item {
            id: 3,
            label: UniquePtr::new(NdrWString::new("c")),
        },
    ])
}

/// Test: conformant structure layout
#[test]
fn test_conformant_struct_layout() {
    init_logging();

    let bytes = to_bytes(&samples(), NdrContext::default()).unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[
            3, 0, 0, 0, // conformance
            3, 0, 0, 0, // count
            0x00, 0x00, 0x02, 0x00, // tag
            0xFF, 0xFF, 20, 0, 0x2C, 0x01, // values
            0, 0, // padding
            5, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, b't', b'e', b'm', b'p', 0, // *tag
        ]
    );

    let decoded: Samples = from_bytes(bytes, NdrContext::default()).unwrap();
    assert_eq!(decoded, samples());
}

/// Test: embedded pointers of array elements follow the whole array
#[test]
fn test_array_of_structs_defers_labels() {
    init_logging();

    let bytes = to_bytes(&items(), NdrContext::default()).unwrap();
    assert_eq!(
        &bytes[..28],
        &[
            3, 0, 0, 0, // size
            1, 0, 0, 0, 0x00, 0x00, 0x02, 0x00, // item 0
            2, 0, 0, 0, 0, 0, 0, 0, // item 1
            3, 0, 0, 0, 0x04, 0x00, 0x02, 0x00, // item 2
        ]
    );
    // label of item 0 comes first, then label of item 2
    assert_eq!(&bytes[28..40], &[2, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0]);
    assert_eq!(&bytes[40..44], &[b'a', 0, 0, 0]);
    assert_eq!(&bytes[56..60], &[b'c', 0, 0, 0]);

    let decoded: ConformantArray<Item> = from_bytes(bytes, NdrContext::default()).unwrap();
    let labels: Vec<Option<&str>> = decoded
        .elements
        .iter()
        .map(|item| item.label.get().map(NdrWString::as_str))
        .collect();
    assert_eq!(labels, vec![Some("a"), None, Some("c")]);
}

/// Test: the same values survive both transfer syntaxes
#[test]
fn test_both_transfer_syntaxes() {
    init_logging();

    for ctx in [NdrContext::default(), NdrContext::ndr64()] {
        let bytes = to_bytes(&items(), ctx).unwrap();
        let decoded: ConformantArray<Item> = from_bytes(bytes, ctx).unwrap();
        assert_eq!(decoded, items());

        let bytes = to_bytes(&samples(), ctx).unwrap();
        let decoded: Samples = from_bytes(bytes, ctx).unwrap();
        assert_eq!(decoded, samples());
    }

    let ndr20 = to_bytes(&items(), NdrContext::default()).unwrap();
    let ndr64 = to_bytes(&items(), NdrContext::ndr64()).unwrap();
    assert!(ndr64.len() > ndr20.len());
}

/// Test: every truncation of a valid stub is an error, never a panic
#[test]
fn test_every_truncation_fails() {
    init_logging();

    let bytes = to_bytes(&samples(), NdrContext::default()).unwrap();
    for len in 0..bytes.len() {
        let result = from_bytes::<Samples>(bytes.slice(..len), NdrContext::default());
        assert!(result.is_err(), "prefix of {} bytes decoded", len);
    }
}

/// Test: a declared size larger than the buffer is rejected
#[test]
fn test_declared_size_beyond_buffer() {
    init_logging();

    let mut stub = to_bytes(&samples(), NdrContext::default()).unwrap().to_vec();
    stub[0] = 0xFF;
    stub[1] = 0x7F;
    let err = from_bytes::<Samples>(stub.into(), NdrContext::default()).unwrap_err();
    assert!(matches!(err, NdrError::BufferOverflow { declared: 0x7FFF, .. }));
}

/// Test: a null [ref] pointer is refused before anything is written
#[test]
fn test_null_ref_pointer_writes_nothing() {
    init_logging();

    let mut w = NdrWriter::new();
    w.write_data(7u32);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        w.write_pointer_with(PointerKind::Ref, false, |_| Ok(()));
    }));
    assert!(result.is_err());
    assert_eq!(w.position(), 4);
    assert_eq!(w.pending(), 0);
}
