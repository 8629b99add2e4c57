//! The layout file is the only record of pending work: it is read at the
//! start of a run and renamed once every entry has been reconciled, so a
//! later run finds nothing to do.

use std::path::Path;

use log::info;

use osutils::host::Host;
use volsetup_api::{
    config::VolsetupConfig,
    error::{InvalidInputError, ReportError, ServicingError, VolsetupError, VolsetupResultExt},
    layout::VolumeLayout,
};

/// Reads and validates the layout at `path`.
pub fn read_layout(host: &dyn Host, path: &Path) -> Result<VolumeLayout, VolsetupError> {
    let contents = host
        .read_to_string(path)
        .structured(InvalidInputError::ReadLayout {
            path: path.display().to_string(),
        })?;

    match VolumeLayout::parse(&contents) {
        Ok(layout) => Ok(layout),
        Err(e) => Err(VolsetupError::new(InvalidInputError::InvalidLayout(e)))
            .message(format!("Volume layout '{}' is invalid", path.display())),
    }
}

/// The layout still waiting to be applied, if any.
pub(super) fn pending_layout(
    host: &dyn Host,
    config: &VolsetupConfig,
) -> Result<Option<VolumeLayout>, VolsetupError> {
    if !host.path_exists(&config.layout_path) {
        info!(
            "No volume layout at '{}', nothing to do",
            config.layout_path.display()
        );
        return Ok(None);
    }

    read_layout(host, &config.layout_path).map(Some)
}

/// Renames the applied layout so it is not applied again.
pub(super) fn archive(host: &mut dyn Host, config: &VolsetupConfig) -> Result<(), VolsetupError> {
    let archived = config.archived_layout_path();
    host.rename(&config.layout_path, &archived)
        .structured(ServicingError::ArchiveLayout {
            path: config.layout_path.display().to_string(),
        })?;
    info!("Archived volume layout as '{}'", archived.display());
    Ok(())
}
