use crate::error::MutationError;

/// File operations the execution coordinator depends on.
///
/// Calls are issued strictly one at a time. Implementations report a
/// [`MutationError::Collision`] when a toggle would land on an existing file;
/// the caller then retries with `merge = true` to request overwrite semantics.
pub trait MutationService {
    /// Enable or disable a package, returning its new path.
    fn toggle(&mut self, file_path: &str, enable: bool, merge: bool)
        -> Result<String, MutationError>;

    /// Move a package into the library root, returning its new path.
    fn relocate_to_root(&mut self, file_path: &str) -> Result<String, MutationError>;

    fn delete(&mut self, file_path: &str) -> Result<(), MutationError>;
}
