//! Utility macros shared by the decoders.

/// Returns early with an error if a condition is not met.
///
/// Works like `assert!` but yields `Err($error)` from the enclosing function instead of panicking.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
