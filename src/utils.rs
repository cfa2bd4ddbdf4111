//! Utility functions for system integration

use std::path::PathBuf;

/// Searches `PATH` for an executable file with the given name
///
/// # Arguments
///
/// * `name` - Binary name to search for (e.g., "pfctl", "nft")
///
/// # Returns
///
/// The full path of the first match, or `None` if the binary is not on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(name);
            if full_path.is_file() {
                Some(full_path)
            } else {
                None
            }
        })
    })
}

/// Whether the process runs with root privileges
pub fn is_root() -> bool {
    nix::unistd::getuid().is_root()
}

/// Truncates a string to a maximum length and adds an ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        // Find the nearest character boundary to avoid splitting multi-byte characters
        let end = s
            .char_indices()
            .map(|(idx, _)| idx)
            .take_while(|&idx| idx <= max_len.saturating_sub(3))
            .last()
            .unwrap_or(0);
        format!("{}...", &s[..end])
    }
}
