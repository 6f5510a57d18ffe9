use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirDatabase {
    MirBase,
    MirGeneDb,
}

impl MirDatabase {
    /// Case-insensitive: `mirbase` or `mirgenedb`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mirbase" => Ok(MirDatabase::MirBase),
            "mirgenedb" => Ok(MirDatabase::MirGeneDb),
            _ => Err(PipelineError::config(format!(
                "unknown miRNA database '{}' (expected miRBase or MirGeneDB)",
                s
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MirDatabase::MirBase => "miRBase",
            MirDatabase::MirGeneDb => "MirGeneDB",
        }
    }
}

impl fmt::Display for MirDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locates bowtie indexes under `{root}/{organism}/index.Libs/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLibraries {
    pub root: PathBuf,
    pub organism: String,
    pub db: MirDatabase,
}

impl ReferenceLibraries {
    pub fn new(root: &Path, organism: &str, db: MirDatabase) -> Self {
        let db = if organism == "hamster" && db != MirDatabase::MirGeneDb {
            log::warn!("no miRBase library exists for hamster, using MirGeneDB");
            MirDatabase::MirGeneDb
        } else {
            db
        };
        Self {
            root: root.to_path_buf(),
            organism: organism.to_string(),
            db,
        }
    }

    /// Index prefix for a library suffix such as `_rrna`. Database-specific
    /// libraries get the family name appended.
    pub fn index_prefix(&self, suffix: &str, with_db: bool) -> PathBuf {
        let mut name = format!("{}{}", self.organism, suffix);
        if with_db {
            name.push_str(self.db.as_str());
        }
        self.root
            .join(&self.organism)
            .join("index.Libs")
            .join(name)
    }

    /// Fails unless the index's first bowtie file (small or large) exists.
    pub fn ensure_exists(&self, prefix: &Path) -> Result<()> {
        let exists = ["1.ebwt", "1.ebwtl"].iter().any(|ext| {
            let mut file = prefix.as_os_str().to_owned();
            file.push(".");
            file.push(ext);
            Path::new(&file).is_file()
        });
        if exists {
            Ok(())
        } else {
            Err(PipelineError::MissingLibrary(prefix.to_path_buf()))
        }
    }
}
