use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use varkeep_core::model::normalize_path;
use varkeep_core::plan::mutation::MutationService;
use varkeep_core::MutationError;

const DISABLED_SUFFIX: &str = ".disabled";

/// Renames, moves and deletes package files inside one library root.
///
/// Enabled packages end in `.var`, disabled ones in `.var.disabled`.
pub struct FsMutationService {
    root: PathBuf,
    use_trash: bool,
}

impl FsMutationService {
    pub fn new(root: &str, use_trash: bool) -> Self {
        Self {
            root: PathBuf::from(root),
            use_trash,
        }
    }

    fn check_in_root(&self, file_path: &str) -> Result<(), MutationError> {
        let root = normalize_path(&self.root.to_string_lossy());
        let path = normalize_path(file_path);
        if root.is_empty() || !path.starts_with(&format!("{}/", root)) {
            return Err(MutationError::InvalidTarget {
                path: file_path.to_string(),
                reason: format!("outside library root {}", self.root.display()),
            });
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(MutationError::InvalidTarget {
                path: file_path.to_string(),
                reason: "relative segments are not allowed".to_string(),
            });
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), MutationError> {
        let display = path.to_string_lossy();
        if self.use_trash {
            trash::delete(path).map_err(|e| {
                MutationError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("trash error for {}: {}", display, e),
                ))
            })
        } else {
            fs::remove_file(path).map_err(|e| MutationError::from_io(&display, e))
        }
    }
}

fn toggled_path(file_path: &str, enable: bool) -> String {
    let lower = file_path.to_ascii_lowercase();
    let disabled = lower.ends_with(DISABLED_SUFFIX);
    match (enable, disabled) {
        (true, true) => file_path[..file_path.len() - DISABLED_SUFFIX.len()].to_string(),
        (false, false) => format!("{}{}", file_path, DISABLED_SUFFIX),
        _ => file_path.to_string(),
    }
}

impl MutationService for FsMutationService {
    fn toggle(
        &mut self,
        file_path: &str,
        enable: bool,
        merge: bool,
    ) -> Result<String, MutationError> {
        self.check_in_root(file_path)?;
        let source = Path::new(file_path);
        if !source.exists() {
            return Err(MutationError::NotFound {
                path: file_path.to_string(),
            });
        }

        let target = toggled_path(file_path, enable);
        if target == file_path {
            return Ok(target);
        }
        let target_path = Path::new(&target);

        if target_path.exists() {
            if !merge {
                return Err(MutationError::Collision { path: target });
            }
            if enable {
                // Same package already active at the destination: drop this copy.
                debug!("Merging {} into existing {}", file_path, target);
                self.remove(source)?;
                return Ok(target);
            }
            warn!("Replacing existing disabled copy {}", target);
            self.remove(target_path)?;
        }

        fs::rename(source, target_path).map_err(|e| MutationError::from_io(file_path, e))?;
        debug!("Renamed {} -> {}", file_path, target);
        Ok(target)
    }

    fn relocate_to_root(&mut self, file_path: &str) -> Result<String, MutationError> {
        self.check_in_root(file_path)?;
        let source = Path::new(file_path);
        let file_name = source
            .file_name()
            .ok_or_else(|| MutationError::InvalidTarget {
                path: file_path.to_string(),
                reason: "no file name".to_string(),
            })?;
        let target_path = self.root.join(file_name);
        let target = target_path.to_string_lossy().to_string();

        if normalize_path(&target) == normalize_path(file_path) {
            return Ok(file_path.to_string());
        }
        if target_path.exists() {
            return Err(MutationError::Collision { path: target });
        }
        fs::rename(source, &target_path).map_err(|e| MutationError::from_io(file_path, e))?;
        debug!("Moved {} -> {}", file_path, target);
        Ok(target)
    }

    fn delete(&mut self, file_path: &str) -> Result<(), MutationError> {
        self.check_in_root(file_path)?;
        let path = Path::new(file_path);
        if !path.exists() {
            return Err(MutationError::NotFound {
                path: file_path.to_string(),
            });
        }
        self.remove(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn make_test_service(dir: &TempDir) -> FsMutationService {
        FsMutationService::new(&dir.path().to_string_lossy(), false)
    }

    fn touch(path: &Path) -> String {
        File::create(path).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_toggled_path() {
        assert_eq!(toggled_path("/l/A.P.1.var", false), "/l/A.P.1.var.disabled");
        assert_eq!(toggled_path("/l/A.P.1.var.disabled", true), "/l/A.P.1.var");
        assert_eq!(toggled_path("/l/A.P.1.var", true), "/l/A.P.1.var");
    }

    #[test]
    fn test_toggle_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut service = make_test_service(&dir);
        let path = touch(&dir.path().join("A.P.1.var"));

        let disabled = service.toggle(&path, false, false).unwrap();
        assert!(disabled.ends_with("A.P.1.var.disabled"));
        assert!(!Path::new(&path).exists());
        let enabled = service.toggle(&disabled, true, false).unwrap();
        assert_eq!(enabled, path);
        assert!(Path::new(&path).exists());
    }

    #[test]
    fn test_enable_collision_then_merge() {
        let dir = TempDir::new().unwrap();
        let mut service = make_test_service(&dir);
        let active = touch(&dir.path().join("A.P.1.var"));
        let disabled = touch(&dir.path().join("A.P.1.var.disabled"));

        let err = service.toggle(&disabled, true, false).unwrap_err();
        assert!(err.is_collision());

        let merged = service.toggle(&disabled, true, true).unwrap();
        assert_eq!(merged, active);
        assert!(!Path::new(&disabled).exists());
        assert!(Path::new(&active).exists());
    }

    #[test]
    fn test_disable_collision_keeps_existing_copy() {
        let dir = TempDir::new().unwrap();
        let mut service = make_test_service(&dir);
        let active = dir.path().join("A.P.1.var");
        let disabled = dir.path().join("A.P.1.var.disabled");
        fs::write(&active, "new-content").unwrap();
        fs::write(&disabled, "other-content").unwrap();
        let active = active.to_string_lossy().to_string();

        let err = service.toggle(&active, false, false).unwrap_err();
        assert!(err.is_collision());
        assert_eq!(fs::read_to_string(&disabled).unwrap(), "other-content");
        assert!(Path::new(&active).exists());

        let merged = service.toggle(&active, false, true).unwrap();
        assert_eq!(merged, disabled.to_string_lossy());
        assert_eq!(fs::read_to_string(&disabled).unwrap(), "new-content");
        assert!(!Path::new(&active).exists());
    }

    #[test]
    fn test_relocate_to_root() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let mut service = make_test_service(&dir);
        let nested = touch(&sub.join("A.P.1.var"));

        let moved = service.relocate_to_root(&nested).unwrap();
        assert_eq!(moved, dir.path().join("A.P.1.var").to_string_lossy());
        assert!(Path::new(&moved).exists());

        let again = touch(&sub.join("A.P.1.var"));
        assert!(service.relocate_to_root(&again).unwrap_err().is_collision());
    }

    #[test]
    fn test_delete_outside_root_rejected() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let mut service = make_test_service(&dir);
        let outside = touch(&other.path().join("A.P.1.var"));

        let err = service.delete(&outside).unwrap_err();
        assert!(matches!(err, MutationError::InvalidTarget { .. }));
        assert!(Path::new(&outside).exists());
    }

    #[test]
    fn test_delete_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut service = make_test_service(&dir);
        let missing = dir.path().join("gone.var").to_string_lossy().to_string();
        assert!(matches!(
            service.delete(&missing),
            Err(MutationError::NotFound { .. })
        ));
    }
}
