//! World directory inspection

use crate::types::Edition;
use std::path::Path;

/// Whether a directory looks like a saved world
///
/// Java worlds carry `level.dat` (and `session.lock` while open); Bedrock worlds
/// carry `level.dat` next to a LevelDB `db/` directory.
pub fn looks_like_world(dir: &Path) -> bool {
    dir.join("level.dat").is_file() || dir.join("session.lock").is_file() || dir.join("db").is_dir()
}

/// Best guess at a world's edition, `None` when the layout is not recognized
pub fn detect_edition(dir: &Path) -> Option<Edition> {
    if dir.join("db").is_dir() {
        return Some(Edition::Bedrock);
    }

    let java_markers = ["region", "session.lock"];
    if java_markers.iter().any(|m| dir.join(m).exists()) || dir.join("level.dat").is_file() {
        return Some(Edition::Java);
    }

    None
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bedrock_layout_is_detected() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("db")).unwrap();
        std::fs::write(temp.path().join("level.dat"), b"").unwrap();

        assert!(looks_like_world(temp.path()));
        assert_eq!(detect_edition(temp.path()), Some(Edition::Bedrock));
    }

    #[test]
    fn java_layout_is_detected() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("region")).unwrap();
        std::fs::write(temp.path().join("level.dat"), b"").unwrap();

        assert!(looks_like_world(temp.path()));
        assert_eq!(detect_edition(temp.path()), Some(Edition::Java));
    }

    #[test]
    fn empty_directory_is_not_a_world() {
        let temp = TempDir::new().unwrap();

        assert!(!looks_like_world(temp.path()));
        assert_eq!(detect_edition(temp.path()), None);
    }
}
