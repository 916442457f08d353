//! Mixer error types.

/// Errors reported by mixer setup and patch upload.
///
/// Rendering itself never fails: malformed voice state is clamped instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MixerError {
    /// A buffer could not be obtained while enabling the mixer.
    #[error("failed to allocate {what} ({bytes} bytes)")]
    Allocation { what: &'static str, bytes: usize },
    /// A sample patch with no frames was offered for upload.
    #[error("patch has no sample data")]
    EmptyPatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn error_display() {
        let err = MixerError::Allocation { what: "accumulator", bytes: 256000 };
        assert_eq!(err.to_string(), "failed to allocate accumulator (256000 bytes)");
        assert_eq!(MixerError::EmptyPatch.to_string(), "patch has no sample data");
    }
}
