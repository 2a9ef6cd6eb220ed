#![forbid(unsafe_code)]

//! Interface to the container holding the signed data files.

/// The container's view of its signed documents.
///
/// Reference checking walks every `SignedInfo` reference that targets a
/// data file and reports it here; the container tracks which of its
/// documents were covered and whether the digests matched.
pub trait ContainerInfo {
    /// Number of data files in the container.
    fn document_count(&self) -> usize;

    /// Reset per-validation tracking.
    fn check_documents_begin(&mut self);

    /// Record that a reference asserts `digest_value` (computed with the
    /// algorithm named by `digest_alg_uri`) for the document at `uri`.
    fn check_document(&mut self, uri: &str, digest_alg_uri: &str, digest_value: &[u8]);

    /// Whether every container document was referenced exactly once with a
    /// matching digest.
    fn check_documents_result(&self) -> bool;
}
