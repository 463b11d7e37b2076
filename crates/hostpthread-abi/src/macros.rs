//! Helper macros for ABI function generation.
//!
//! `abi_fn!` generates `pub unsafe extern "C" fn` wrappers. The POSIX names
//! are exported unmangled only with the `export-symbols` feature; without it
//! they are ordinary Rust items, so test binaries keep the system symbols.

/// Generate an `extern "C"` entry point.
///
/// # Usage
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn my_func(arg1: Type1, arg2: Type2) -> ReturnType {
///         // implementation body
///     }
/// }
/// ```
///
/// The `unwind` form uses the `"C-unwind"` ABI, for entry points that end
/// the calling thread by unwinding.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg_attr(feature = "export-symbols", unsafe(no_mangle))]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };

    // Variant without return type (returns ())
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg_attr(feature = "export-symbols", unsafe(no_mangle))]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };

    (
        $(#[$meta:meta])*
        unwind fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg_attr(feature = "export-symbols", unsafe(no_mangle))]
        #[allow(unused_unsafe)]
        pub unsafe extern "C-unwind" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };

    (
        $(#[$meta:meta])*
        unwind fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg_attr(feature = "export-symbols", unsafe(no_mangle))]
        #[allow(unused_unsafe)]
        pub unsafe extern "C-unwind" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };
}

pub(crate) use abi_fn;
