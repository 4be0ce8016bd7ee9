//! Model loading
//!
//! Each supported format has a pure `parse(name, bytes) -> Model` adapter.
//! [`load_model`] picks the adapter from the file extension, then validates the
//! result and resolves global bone poses so every loaded model satisfies the
//! model invariants before merging starts.

pub mod cast;
pub mod semodel;

use std::path::{Path, PathBuf};

use model_common::Model;

use crate::MergeError;

/// Supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Cast,
    SeModel,
}

impl ModelFormat {
    /// Detect the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "cast" => Some(Self::Cast),
            "semodel" => Some(Self::SeModel),
            _ => None,
        }
    }

    pub fn parse(self, name: &str, data: &[u8]) -> anyhow::Result<Model> {
        match self {
            Self::Cast => cast::parse(name, data),
            Self::SeModel => semodel::parse(name, data),
        }
    }
}

/// Model name for a path: the file stem
fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load, validate and resolve a single model file
pub fn load_model(path: &Path) -> Result<Model, MergeError> {
    let format = ModelFormat::from_path(path).ok_or_else(|| MergeError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let name = model_name(path);

    tracing::info!("Loading {}", name);

    let data = std::fs::read(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut model = format
        .parse(&name, &data)
        .map_err(|err| MergeError::malformed(&name, format_args!("{:#}", err)))?;
    model
        .resolve()
        .map_err(|err| MergeError::malformed(&name, err))?;

    tracing::info!(
        "Loaded {} ({} bones, {} meshes, {} materials, {} shapes)",
        name,
        model.bones.len(),
        model.meshes.len(),
        model.materials.len(),
        model.shapes.len()
    );

    Ok(model)
}

/// Models loaded from a set of paths, plus the paths that were skipped
#[derive(Debug, Default)]
pub struct LoadedModels {
    pub models: Vec<Model>,
    pub skipped: Vec<PathBuf>,
}

/// Load every supported file in `paths`.
///
/// Paths are sorted first so the result does not depend on argument order.
/// Files with unsupported extensions are logged and skipped; any other load
/// failure aborts.
pub fn load_models<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedModels, MergeError> {
    let mut sorted: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort();
    sorted.dedup();

    let mut loaded = LoadedModels {
        models: Vec::with_capacity(sorted.len()),
        skipped: Vec::new(),
    };

    for path in sorted {
        match load_model(path) {
            Ok(model) => loaded.models.push(model),
            Err(MergeError::UnsupportedFormat { path }) => {
                tracing::warn!("Invalid file, skipping: {}", path.display());
                loaded.skipped.push(path);
            }
            Err(err) => return Err(err),
        }
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ModelFormat::from_path(Path::new("a/body.cast")),
            Some(ModelFormat::Cast)
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("HEAD.SEModel")),
            Some(ModelFormat::SeModel)
        );
        assert_eq!(ModelFormat::from_path(Path::new("readme.txt")), None);
        assert_eq!(ModelFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_model_name_is_file_stem() {
        assert_eq!(model_name(Path::new("models/arm_left.cast")), "arm_left");
    }

    #[test]
    fn test_unsupported_is_skipped() {
        let loaded = load_models(&["notes.txt", "image.png"]).unwrap();
        assert!(loaded.models.is_empty());
        assert_eq!(
            loaded.skipped,
            vec![PathBuf::from("image.png"), PathBuf::from("notes.txt")]
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_model(Path::new("/nonexistent/dir/body.cast")).unwrap_err();
        assert!(matches!(err, MergeError::Io { .. }));
    }
}
