use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use roomify_contracts::image::CanonicalImage;
use roomify_contracts::project::is_file_safe_id;

pub fn export_file_name(project_id: &str, image: &CanonicalImage) -> String {
    format!("roomify-{}.{}", project_id, image.file_extension())
}

/// Writes the decoded image to `<out_dir>/roomify-<id>.<ext>`.
pub fn export_image(project_id: &str, image: &CanonicalImage, out_dir: &Path) -> Result<PathBuf> {
    if !is_file_safe_id(project_id) {
        bail!("project id {project_id:?} cannot be used in a file name");
    }
    let (_, bytes) = image
        .split()
        .with_context(|| format!("render for project {project_id} is not decodable"))?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let target = out_dir.join(export_file_name(project_id, image));
    std::fs::write(&target, bytes)
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(target)
}
