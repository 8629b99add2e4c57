use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{debug, info};

use osutils::host::Host;
use volsetup_api::{
    config::VolsetupConfig,
    constants::DEV_DIRECTORY,
    error::{InternalError, ReportError, VolsetupError},
    layout::{VolumeKind, VolumeLayout, VolumeLayoutEntry},
};

mod direct;
mod discovery;
mod marker;
mod raid10;

pub use marker::read_layout;

use raid10::{ArraySlots, DeclaredVolume, VerifiedVolume};

/// Everything a reconciliation step needs besides the host.
pub(crate) struct EngineContext<'a> {
    pub config: &'a VolsetupConfig,
    pub layout: VolumeLayout,
}

impl EngineContext<'_> {
    /// Where the mount point of `entry` lives on this host.
    pub fn mount_point(&self, entry: &VolumeLayoutEntry) -> PathBuf {
        self.config.resolve_mount_point(&entry.mount_point)
    }
}

/// Path of the block device `name`.
fn dev_path(name: impl AsRef<Path>) -> PathBuf {
    Path::new(DEV_DIRECTORY).join(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The layout was reconciled and archived.
    Applied,

    /// There was no layout waiting to be applied.
    NothingToDo,
}

/// Brings the host in line with the pending volume layout, then archives
/// the layout.
pub fn apply(host: &mut dyn Host, config: &VolsetupConfig) -> Result<ApplyOutcome, VolsetupError> {
    config.validate()?;

    let Some(layout) = marker::pending_layout(host, config)? else {
        return Ok(ApplyOutcome::NothingToDo);
    };

    let ctx = EngineContext { config, layout };
    if ctx.layout.is_empty() {
        info!("Volume layout has no entries");
    } else {
        reconcile(host, &ctx)?;
    }

    marker::archive(host, config)?;
    Ok(ApplyOutcome::Applied)
}

fn reconcile(host: &mut dyn Host, ctx: &EngineContext) -> Result<(), VolsetupError> {
    info!(
        "Reconciling {} mount points from '{}'",
        ctx.layout.entries.len(),
        ctx.config.layout_path.display()
    );

    discovery::wait_for_devices(host, ctx)?;
    discovery::assemble_previous_arrays(host, ctx)?;
    let state = discovery::discover(host, ctx)?;

    // Every RAID10 volume must be consistent before the host is touched
    let mut volumes = ctx
        .layout
        .entries
        .iter()
        .filter_map(DeclaredVolume::new)
        .map(|volume| -> Result<_, VolsetupError> {
            let verified = volume.discover(&state)?.verify()?;
            debug!(
                "Plan for '{}': {:?}",
                verified.entry().mount_point.display(),
                verified.plan()
            );
            Ok((verified.entry().line, verified))
        })
        .collect::<Result<BTreeMap<usize, VerifiedVolume>, VolsetupError>>()?;

    let mut slots = ArraySlots::default();
    for entry in &ctx.layout.entries {
        info!(
            "Setting up '{}' ({})",
            entry.mount_point.display(),
            entry.kind
        );
        match entry.kind {
            VolumeKind::Single => direct::single(host, ctx, entry)?,
            VolumeKind::Symlink => direct::symlink(host, ctx, entry)?,
            VolumeKind::PlainLvm => direct::plain_lvm(host, ctx, &state, entry)?,
            VolumeKind::Raid10 => volumes
                .remove(&entry.line)
                .structured(InternalError::Internal("RAID10 volume was not verified"))?
                .setup(host, ctx, &mut slots)?,
        }
    }

    Ok(())
}
