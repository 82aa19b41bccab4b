//! Device and dtype normalisation.
//!
//! Devices and dtypes are opaque strings handed straight to drivers. The only
//! normalisation the registry applies is resolving a missing or empty value to
//! the defaults below.

/// Device used when none is requested.
pub const DEFAULT_DEVICE: &str = "cpu";

/// Dtype used when none is requested.
pub const DEFAULT_DTYPE: &str = "float32";

/// Dtypes commonly understood by drivers.
pub const SUPPORTED_DTYPES: &[&str] = &["float32", "float16", "bfloat16", "int8", "int16", "int32"];

/// Resolve a requested device, falling back to [`DEFAULT_DEVICE`].
pub fn resolve_device(device: Option<&str>) -> String {
    match device {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => DEFAULT_DEVICE.to_string(),
    }
}

/// Resolve a requested dtype, falling back to [`DEFAULT_DTYPE`].
pub fn resolve_dtype(dtype: Option<&str>) -> String {
    match dtype {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => DEFAULT_DTYPE.to_string(),
    }
}

pub fn is_supported_dtype(dtype: &str) -> bool {
    SUPPORTED_DTYPES.contains(&dtype)
}

/// Trim and lowercase a device string (`" CUDA:0 "` -> `"cuda:0"`).
pub fn normalize_device(device: &str) -> String {
    device.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_resolve_to_defaults() {
        assert_eq!(resolve_device(None), "cpu");
        assert_eq!(resolve_device(Some("")), "cpu");
        assert_eq!(resolve_dtype(None), "float32");
        assert_eq!(resolve_dtype(Some("")), "float32");
    }

    #[test]
    fn explicit_values_pass_through() {
        assert_eq!(resolve_device(Some("cuda:1")), "cuda:1");
        assert_eq!(resolve_dtype(Some("exotic8")), "exotic8");
    }

    #[test]
    fn dtype_table() {
        assert!(is_supported_dtype("bfloat16"));
        assert!(!is_supported_dtype("float64"));
    }

    #[test]
    fn normalizes_device_strings() {
        assert_eq!(normalize_device("  MPS "), "mps");
    }
}
