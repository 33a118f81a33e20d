use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Subdirectory of the data root holding every named index.
const SEARCH_DIR: &str = "Search";

/// Engine-specific subdirectory below [`SEARCH_DIR`].
const ENGINE_DIR: &str = "Tantivy";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path
    /// 2. The INDEXKIT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/indexkit/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("INDEXKIT_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("indexkit")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory holding one subdirectory per named index.
    pub fn index_root(&self) -> Result<PathBuf> {
        let path = self.root.join(SEARCH_DIR).join(ENGINE_DIR);
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }
}
