use std::path::{Path, PathBuf};

/// Resolve a server command to an executable path.
///
/// Bare names are looked up on `PATH` (or the configured `PATH` override);
/// anything containing a separator is used as given. When lookup fails the
/// bare name is returned so the spawn error names what was tried.
pub fn resolve_command(command: &str, path_override: Option<&str>, cwd: &Path) -> PathBuf {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        return PathBuf::from(command);
    }

    let found = match path_override {
        Some(paths) => which::which_in(command, Some(paths), cwd),
        None => which::which(command),
    };
    match found {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(command, "command not found on PATH: {e}");
            PathBuf::from(command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_paths_are_kept() {
        let cwd = std::env::temp_dir();
        assert_eq!(
            resolve_command("/usr/local/bin/npx", None, &cwd),
            PathBuf::from("/usr/local/bin/npx")
        );
        assert_eq!(
            resolve_command("./bin/server", None, &cwd),
            PathBuf::from("./bin/server")
        );
    }

    #[test]
    fn missing_command_falls_back_to_name() {
        let cwd = std::env::temp_dir();
        let resolved = resolve_command("definitely-not-a-real-command-xyz", Some(""), &cwd);
        assert_eq!(resolved, PathBuf::from("definitely-not-a-real-command-xyz"));
    }

    #[cfg(unix)]
    #[test]
    fn finds_command_in_override_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool-server");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = dir.path().to_string_lossy().to_string();
        let resolved = resolve_command("tool-server", Some(&path), dir.path());
        assert_eq!(resolved, exe);
    }
}
