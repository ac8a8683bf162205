use std::env;
use std::path::{Path, PathBuf};

/// Find the first candidate that resolves to an executable file.
///
/// A candidate containing a path separator is checked as a file path relative to the working
/// directory, a bare name is searched in the directories of `PATH`.
pub fn locate_runtime<S: AsRef<str>>(candidates: &[S]) -> Option<PathBuf> {
    let search_path = env::var_os("PATH");

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let found = if has_separator(candidate) {
            Some(PathBuf::from(candidate)).filter(|path| is_executable(path))
        } else {
            search_path.as_ref().and_then(|paths| {
                env::split_paths(paths)
                    .map(|dir| dir.join(candidate))
                    .find(|path| is_executable(path))
            })
        };

        match found {
            Some(path) => {
                log::debug!("Found connx runtime at {}", path.display());
                return Some(path);
            }
            None => log::trace!("No connx runtime at '{candidate}'"),
        }
    }

    None
}

fn has_separator(candidate: &str) -> bool {
    candidate.contains('/') || candidate.contains(std::path::MAIN_SEPARATOR)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
