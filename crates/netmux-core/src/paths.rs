//! Default filesystem locations.

use std::path::PathBuf;

/// Returns the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/netmux.sock` if available,
/// otherwise falls back to `/tmp/netmux-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("netmux.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/netmux-{}.sock", uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_socket_path_format() {
        let path = default_socket_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("netmux"));
        assert!(path_str.ends_with(".sock"));
    }
}
