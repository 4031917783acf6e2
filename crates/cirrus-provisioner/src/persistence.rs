use std::path::Path;

use crate::error::ProvisionerError;
use crate::plan::Plan;

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ProvisionerError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn save_plan(path: &Path, plan: &Plan) -> Result<(), ProvisionerError> {
    let json = plan.to_json()?;
    write_atomic(path, json.as_bytes())?;
    tracing::info!(path = %path.display(), records = plan.len(), "plan saved");
    Ok(())
}

pub fn load_plan(path: &Path) -> Result<Plan, ProvisionerError> {
    let contents = std::fs::read_to_string(path)?;
    Plan::from_json(&contents)
}
