use std::path::{Path, PathBuf};

/// Directory under the working directory that holds all run state.
pub const STATE_DIR: &str = ".stackup";

/// File locations for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    pub fn new(work_dir: impl AsRef<Path>, environment: &str) -> Self {
        Self {
            root: work_dir.as_ref().join(STATE_DIR).join(environment),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolved(&self) -> PathBuf {
        self.root.join("resolved.json")
    }

    pub fn host_view(&self) -> PathBuf {
        self.root.join("resolved.host.json")
    }

    pub fn artifacts(&self) -> PathBuf {
        self.root.join("terraform")
    }

    pub fn port_forward(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("port-forward.{}.json", namespace))
    }

    pub fn lock(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Output of detached forwarder processes.
    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let paths = RunPaths::new("/work", "dev");
        assert_eq!(paths.resolved(), PathBuf::from("/work/.stackup/dev/resolved.json"));
        assert_eq!(
            paths.port_forward("shop-dev"),
            PathBuf::from("/work/.stackup/dev/port-forward.shop-dev.json")
        );
        assert_eq!(paths.artifacts(), PathBuf::from("/work/.stackup/dev/terraform"));
    }
}
