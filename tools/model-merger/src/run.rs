//! End-to-end merge run: load, resolve, encode, write

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{encode_model, load_models, merge_models};

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Resolve and encode, but write nothing
    pub dry_run: bool,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub root: String,
    /// Written (or, for a dry run, would-be) output path
    pub output: PathBuf,
    pub written: bool,
    pub models: usize,
    pub skipped: Vec<PathBuf>,
    pub bones: usize,
    pub meshes: usize,
    pub materials: usize,
    pub shapes: usize,
    pub bytes: usize,
}

/// Output path for a merged model named `root`
pub fn output_path(output_dir: &Path, root: &str) -> PathBuf {
    output_dir.join(format!("{}.cast", root))
}

/// Run the full pipeline. The output directory is only created once the
/// merged model has been encoded, so a failed run leaves nothing behind.
pub fn run_merge(options: &MergeOptions) -> Result<MergeReport> {
    let loaded = load_models(options.inputs.as_slice())?;
    let merged = merge_models(&loaded.models)?;
    let bytes = encode_model(&merged)
        .with_context(|| format!("Failed to encode {}", merged.name))?;

    let output = output_path(&options.output_dir, &merged.name);

    if options.dry_run {
        tracing::info!(
            "Dry run, would save {} ({} bytes)",
            output.display(),
            bytes.len()
        );
    } else {
        tracing::info!("Saving {}", merged.name);
        std::fs::create_dir_all(&options.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                options.output_dir.display()
            )
        })?;
        std::fs::write(&output, &bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        tracing::info!("Saved {}", merged.name);
    }

    let report = MergeReport {
        root: merged.name.clone(),
        output,
        written: !options.dry_run,
        models: loaded.models.len(),
        skipped: loaded.skipped,
        bones: merged.bones.len(),
        meshes: merged.meshes.len(),
        materials: merged.materials.len(),
        shapes: merged.shapes.len(),
        bytes: bytes.len(),
    };

    tracing::info!(
        "Merged {} models into {}: {} bones, {} meshes, {} materials, {} shapes",
        report.models,
        report.root,
        report.bones,
        report.meshes,
        report.materials,
        report.shapes
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("Merged Models"), "body"),
            PathBuf::from("Merged Models/body.cast")
        );
    }

    #[test]
    fn test_nothing_loaded_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("out");
        let options = MergeOptions {
            inputs: vec![dir.path().join("readme.txt")],
            output_dir: output_dir.clone(),
            dry_run: false,
        };

        let err = run_merge(&options).unwrap_err();
        assert!(err.to_string().contains("root model"));
        assert!(!output_dir.exists());
    }
}
