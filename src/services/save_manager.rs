use crate::engines::generation::Genome;
use crate::error::{EvotraderError, Result};
use std::path::{Path, PathBuf};

/// Storage for the best network between runs
pub trait SaveManager: Send + Sync {
    /// `Ok(None)` when nothing was saved yet
    fn load(&self) -> Result<Option<Genome>>;
    fn save(&self, genome: &Genome) -> Result<()>;
}

/// Keeps the genome as pretty JSON in a single file
pub struct JsonSaveManager {
    path: PathBuf,
}

impl JsonSaveManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaveManager for JsonSaveManager {
    fn load(&self) -> Result<Option<Genome>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| EvotraderError::Persistence(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let genome: Genome = serde_json::from_str(&json)
            .map_err(|e| EvotraderError::Persistence(format!("Failed to parse {}: {}", self.path.display(), e)))?;
        genome.validate()?;
        log::info!("Loaded genome from {}", self.path.display());
        Ok(Some(genome))
    }

    fn save(&self, genome: &Genome) -> Result<()> {
        let json = serde_json::to_string_pretty(genome)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        // Readers never see a half written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| EvotraderError::Persistence(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            EvotraderError::Persistence(format!("Failed to move {} into place: {}", tmp.display(), e))
        })?;
        Ok(())
    }
}
