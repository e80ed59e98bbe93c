//! Runtime library discovery.
//!
//! ort is built in `load-dynamic` mode, so the onnxruntime shared library
//! must be locatable at process start. This resolves the auxiliary binary
//! path once per process and exports it through `ORT_DYLIB_PATH`;
//! re-invoking it is a no-op when the variable is already set.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[cfg(target_os = "linux")]
const ORT_LIB_NAME: &str = "libonnxruntime.so";
#[cfg(target_os = "macos")]
const ORT_LIB_NAME: &str = "libonnxruntime.dylib";
#[cfg(windows)]
const ORT_LIB_NAME: &str = "onnxruntime.dll";

const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

/// Search directories for the onnxruntime library, probed in order:
///   1. the configured runtime dir, if any
///   2. `<exe_dir>/` (Windows only)
///   3. `<exe_dir>/lib/`
///   4. `<exe_dir>/../lib/`
///   5. `<cwd>/lib/`
///   6. `/usr/local/lib/`, `/usr/lib/` (Unix only)
fn candidate_lib_dirs(runtime_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = runtime_dir {
        dirs.push(dir.to_path_buf());
    }
    if let Ok(exe) = env::current_exe().and_then(|p| p.canonicalize()) {
        if let Some(exe_dir) = exe.parent() {
            #[cfg(windows)]
            {
                dirs.push(exe_dir.to_path_buf());
            }
            dirs.push(exe_dir.join("lib"));
            if let Some(parent) = exe_dir.parent() {
                dirs.push(parent.join("lib"));
            }
        }
    }
    if let Ok(cwd) = env::current_dir() {
        let cwd_lib = cwd.join("lib");
        if !dirs.contains(&cwd_lib) {
            dirs.push(cwd_lib);
        }
    }
    #[cfg(unix)]
    {
        dirs.push(PathBuf::from("/usr/local/lib"));
        dirs.push(PathBuf::from("/usr/lib"));
    }
    dirs
}

fn find_ort_dylib(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(ORT_LIB_NAME))
        .find(|candidate| candidate.is_file())
}

/// Locate the onnxruntime library and export its path for ort.
///
/// An already-set `ORT_DYLIB_PATH` always wins. When no library can be
/// found, a warning is logged and ort's own fallback lookup applies.
pub fn configure_ort_dylib(runtime_dir: Option<&Path>) {
    if env::var_os(ORT_DYLIB_ENV).is_some() {
        debug!("{ORT_DYLIB_ENV} already set; leaving runtime path untouched");
        return;
    }

    match find_ort_dylib(&candidate_lib_dirs(runtime_dir)) {
        Some(path) => {
            debug!(path = %path.display(), "Resolved onnxruntime library");
            env::set_var(ORT_DYLIB_ENV, &path);
        }
        None => {
            warn!(
                lib = ORT_LIB_NAME,
                "onnxruntime library not found near the executable; relying on system lookup"
            );
        }
    }
}
