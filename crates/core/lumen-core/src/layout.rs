//! Compile-time checks for firmware structure layouts.

/// Asserts at compile time that a type has exactly the given size in bytes.
///
/// Firmware tables are read by reinterpreting raw bytes, so every structure
/// mirroring one must match the published layout byte for byte. Packed
/// types can additionally be checked for an alignment of one.
///
/// ```ignore
/// lumen_core::assert_layout!(SdtHeader, size = 36, packed);
/// lumen_core::assert_layout!(u32, size = 4);
/// ```
#[macro_export]
macro_rules! assert_layout {
    ($ty:ty, size = $size:expr $(,)?) => {
        const _: () = assert!(
            ::core::mem::size_of::<$ty>() == $size,
            concat!("unexpected size for ", stringify!($ty)),
        );
    };
    ($ty:ty, size = $size:expr, packed $(,)?) => {
        $crate::assert_layout!($ty, size = $size);
        const _: () = assert!(
            ::core::mem::align_of::<$ty>() == 1,
            concat!(stringify!($ty), " must be byte-aligned"),
        );
    };
}
