use crate::common::error::StackcheckError;
use cargo_metadata::MetadataCommand;
use std::fs;
use std::path::Path;
use anyhow::{Context, Result};

pub struct ProjectLoader;

impl ProjectLoader {
    /// Load all source files from a Cargo workspace manifest.
    /// Returns a vector of (crate_name, file_path, file_content).
    pub fn load_workspace(manifest_path: &str) -> Result<Vec<(String, String, String)>> {
        let metadata = MetadataCommand::new()
            .manifest_path(manifest_path)
            .no_deps()
            .exec()
            .context("Failed to execute cargo metadata")?;

        let mut files = Vec::new();

        for package_id in &metadata.workspace_members {
            if let Some(package) = metadata.packages.iter().find(|p| &p.id == package_id) {
                // Hyphens are not valid in paths written in source (`my_crate::f`).
                let crate_name = package.name.replace('-', "_");

                for target in &package.targets {
                    if !target.kind.iter().any(|k| k == "lib" || k == "bin" || k == "proc-macro") {
                        continue;
                    }
                    let src_path = &target.src_path;
                    let src_dir = src_path.parent().unwrap_or(src_path);
                    Self::collect_rs_recursive(src_dir.as_std_path(), &crate_name, &mut files)?;
                }
            }
        }

        // lib and bin targets usually share src/
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files.dedup_by(|a, b| a.1 == b.1);

        log::info!("Loaded {} source files from {}", files.len(), manifest_path);
        Ok(files)
    }

    /// Load every `.rs` file below `dir` as part of one crate.
    pub fn load_dir(dir: &Path, crate_name: &str) -> Result<Vec<(String, String, String)>> {
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {}", dir.display());
        }
        let mut files = Vec::new();
        Self::collect_rs_recursive(dir, crate_name, &mut files)?;
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    /// Fail unless some loaded file belongs to `target`.
    pub fn require_target(files: &[(String, String, String)], target: &str) -> Result<(), StackcheckError> {
        if files.iter().any(|(crate_name, _, _)| crate_name == target) {
            Ok(())
        } else {
            Err(StackcheckError::TargetNotFound(target.to_string()))
        }
    }

    fn collect_rs_recursive(
        dir: &Path,
        crate_name: &str,
        out: &mut Vec<(String, String, String)>,
    ) -> Result<()> {
        if dir.ends_with("target") || dir.ends_with(".git") {
            return Ok(());
        }
        if !dir.exists() {
            return Ok(());
        }

        if dir.is_file() {
            if dir.extension().is_some_and(|ext| ext == "rs") {
                Self::read_into(dir, crate_name, out)?;
            }
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_rs_recursive(&path, crate_name, out)?;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                Self::read_into(&path, crate_name, out)?;
            }
        }
        Ok(())
    }

    fn read_into(path: &Path, crate_name: &str, out: &mut Vec<(String, String, String)>) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        out.push((crate_name.to_string(), path.display().to_string(), content));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_dir_collects_sorted_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/irq")).unwrap();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "mod irq;").unwrap();
        fs::write(dir.path().join("src/irq/mod.rs"), "pub fn ack() {}").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "skip").unwrap();
        fs::write(dir.path().join("target/debug/gen.rs"), "fn skip() {}").unwrap();

        let files = ProjectLoader::load_dir(dir.path(), "kernel").unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.1.as_str()).collect();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("irq/mod.rs"));
        assert!(paths[1].ends_with("lib.rs"));
        assert!(files.iter().all(|f| f.0 == "kernel"));
    }

    #[test]
    fn test_require_target() {
        let files = vec![("kernel".to_string(), "lib.rs".to_string(), String::new())];
        assert!(ProjectLoader::require_target(&files, "kernel").is_ok());
        assert!(matches!(
            ProjectLoader::require_target(&files, "driver"),
            Err(StackcheckError::TargetNotFound(name)) if name == "driver"
        ));
    }

    #[test]
    fn test_load_dir_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectLoader::load_dir(&dir.path().join("absent"), "k").is_err());
    }
}
