// src/project.rs

//! Per-project directory layout
//!
//! Everything a run produces lives under one project root:
//!
//! ```text
//! <root>/content/<subsystem>/datapackage.json
//! <root>/content/<subsystem>/<dialect>-ddl.sql
//! <root>/content/<subsystem>/<dialect>-fk-ddl.sql
//! <root>/content/<subsystem>/data/<table>.tsv
//! <root>/content/<subsystem>/documents/<table>_<column><rowid>.data
//! <root>/tmp/<subsystem>-config.db
//! <root>/tmp/<subsystem>-tables.txt
//! <root>/tmp/<subsystem>-copy.sql
//! <root>/tmp/<subsystem>-deps.json      (written only on cycle detection)
//! ```

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Resolved paths for one subsystem under a project root.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    tmp_root: Option<PathBuf>,
    subsystem: String,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, subsystem: impl Into<String>) -> Self {
        Project {
            root: root.into(),
            tmp_root: None,
            subsystem: subsystem.into(),
        }
    }

    /// Archive runs may keep content and scratch state under different
    /// roots (content read from the source project, tmp written to the
    /// target).
    pub fn with_tmp_root(
        root: impl Into<PathBuf>,
        tmp_root: impl Into<PathBuf>,
        subsystem: impl Into<String>,
    ) -> Self {
        Project {
            root: root.into(),
            tmp_root: Some(tmp_root.into()),
            subsystem: subsystem.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content").join(&self.subsystem)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.content_dir().join("data")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.content_dir().join("documents")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp_root.as_ref().unwrap_or(&self.root).join("tmp")
    }

    pub fn datapackage_path(&self) -> PathBuf {
        self.content_dir().join("datapackage.json")
    }

    pub fn ddl_path(&self, dialect: &str) -> PathBuf {
        self.content_dir().join(format!("{dialect}-ddl.sql"))
    }

    pub fn fk_ddl_path(&self, dialect: &str) -> PathBuf {
        self.content_dir().join(format!("{dialect}-fk-ddl.sql"))
    }

    pub fn config_db_path(&self) -> PathBuf {
        self.tmp_dir().join(format!("{}-config.db", self.subsystem))
    }

    pub fn tables_file(&self) -> PathBuf {
        self.tmp_dir().join(format!("{}-tables.txt", self.subsystem))
    }

    pub fn copy_file(&self) -> PathBuf {
        self.tmp_dir().join(format!("{}-copy.sql", self.subsystem))
    }

    pub fn deps_file(&self) -> PathBuf {
        self.tmp_dir().join(format!("{}-deps.json", self.subsystem))
    }

    pub fn tsv_path(&self, norm_table: &str) -> PathBuf {
        self.data_dir().join(format!("{norm_table}.tsv"))
    }

    pub fn sidecar_path(&self, file_name: &str) -> PathBuf {
        self.documents_dir().join(file_name)
    }

    /// Create the content and tmp directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.content_dir())?;
        std::fs::create_dir_all(self.tmp_dir())?;
        Ok(())
    }

    /// Remove scratch intermediates (plan file, tables list, deps dump).
    /// The config store is kept so runs stay re-entrant.
    pub fn clean_scratch(&self) -> Result<()> {
        for path in [self.tables_file(), self.copy_file(), self.deps_file()] {
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let project = Project::new("/work/proj", "crm");
        assert_eq!(
            project.datapackage_path(),
            PathBuf::from("/work/proj/content/crm/datapackage.json")
        );
        assert_eq!(
            project.ddl_path("sqlite"),
            PathBuf::from("/work/proj/content/crm/sqlite-ddl.sql")
        );
        assert_eq!(
            project.fk_ddl_path("sqlite"),
            PathBuf::from("/work/proj/content/crm/sqlite-fk-ddl.sql")
        );
        assert_eq!(
            project.config_db_path(),
            PathBuf::from("/work/proj/tmp/crm-config.db")
        );
        assert_eq!(
            project.tsv_path("customers"),
            PathBuf::from("/work/proj/content/crm/data/customers.tsv")
        );
        assert_eq!(
            project.deps_file(),
            PathBuf::from("/work/proj/tmp/crm-deps.json")
        );
    }

    #[test]
    fn test_split_roots() {
        let project = Project::with_tmp_root("/archive/src", "/archive/out", "crm");
        assert_eq!(
            project.datapackage_path(),
            PathBuf::from("/archive/src/content/crm/datapackage.json")
        );
        assert_eq!(
            project.config_db_path(),
            PathBuf::from("/archive/out/tmp/crm-config.db")
        );
    }

    #[test]
    fn test_ensure_and_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let project = Project::new(tmp.path(), "sys");
        project.ensure_dirs().unwrap();
        assert!(project.content_dir().is_dir());
        assert!(project.tmp_dir().is_dir());

        std::fs::write(project.tables_file(), "# tables\n").unwrap();
        std::fs::write(project.copy_file(), "").unwrap();
        project.clean_scratch().unwrap();
        assert!(!project.tables_file().exists());
        assert!(!project.copy_file().exists());
    }
}
