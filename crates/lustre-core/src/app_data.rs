//! Where Lustre stores its own data (config, persisted index).
//!
//! The catalog export stays wherever the operator keeps it. We only store app state here.

use std::path::PathBuf;

/// Returns the directory where Lustre stores config, the index, and other app data.
/// On Linux: `~/.local/share/lustre/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Lustre", "Lustre")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default home of the persisted `vectors.json` / `catalog.json` pair.
pub fn index_dir() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("index"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_dir_is_under_app_data() {
        let (Some(data), Some(index)) = (app_data_dir(), index_dir()) else {
            return;
        };
        assert!(index.starts_with(data));
    }
}
