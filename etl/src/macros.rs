//! Macros for building [`crate::error::EtlError`] values with less boilerplate.

/// Creates an [`crate::error::EtlError`] from an error kind and a static description.
///
/// An optional third argument adds dynamic detail, anything implementing `Display` works.
/// `source: err` attaches the underlying error.
///
/// ```
/// use etl::error::ErrorKind;
/// use etl::etl_error;
///
/// let err = etl_error!(ErrorKind::EndpointNotFound, "Unknown endpoint", "profiles");
/// assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
/// ```
#[macro_export]
macro_rules! etl_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::EtlError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::EtlError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::EtlError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::EtlError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with an [`crate::error::EtlError`] built like [`etl_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::etl_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::etl_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::etl_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::etl_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
