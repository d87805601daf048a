//! Result assertions that name the failing expression

/// Unwrap an `Ok`, panicking with the expression and its error otherwise
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("`{}` failed: {:?}", stringify!($result), e),
        }
    };
}

/// Expect an `Err`, optionally of a given shape
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "`{}` unexpectedly succeeded", stringify!($result));
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("`{}` unexpectedly succeeded: {:?}", stringify!($result), value),
            Err(e) => panic!("`{}` failed with the wrong error: {:?}", stringify!($result), e),
        }
    };
}

/// Substring check for error messages
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        assert!(
            $haystack.contains($needle),
            "expected {:?} to contain {:?}",
            $haystack,
            $needle
        );
    };
}

/// Assert that a value lies within an inclusive range
#[macro_export]
macro_rules! assert_in_range {
    ($value:expr, $min:expr, $max:expr) => {
        assert!(
            $value >= $min && $value <= $max,
            "expected {:?} to be in range [{:?}, {:?}]",
            $value,
            $min,
            $max
        );
    };
}
