//! Simulator release staging
//!
//! A simulator release is a directory of support libraries plus the
//! simulator executable. Before a run the release is checked, remembered in
//! the per-variant marker file and linked into the variant linkfarm.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use crate::error::{RegressError, Result};
use crate::layout::BuildLayout;
use crate::process::{join_search_path, EnvOverrides};
use crate::variant::HardwareVariant;

/// Library directories every release ships, as `so64_<name>`.
pub const RELEASE_LIBS: [&str; 4] = ["paqobjs", "cima_objs", "gcmobjs", "kgenobjs"];

/// Libraries the variant build must have produced.
pub const BUILD_LIBS: [&str; 12] = [
    "ngwcutils", "sdm", "rm_common", "rm_iml", "rmc", "rms", "afd", "ral", "sdm",
    "spectraapp", "spectrainfra", "spectra_swig",
];

/// Additional libraries when building the ported code base.
pub const PORTED_LIBS: [&str; 2] = ["asd2", "cad"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorRelease {
    variant: HardwareVariant,
    prefix: PathBuf,
    release: String,
}

impl SimulatorRelease {
    pub fn new(variant: HardwareVariant, release: impl Into<String>) -> Self {
        Self {
            variant,
            prefix: PathBuf::from(variant.release().prefix),
            release: release.into(),
        }
    }

    /// The known-stable release of a variant.
    pub fn stable(variant: HardwareVariant) -> Self {
        Self::new(variant, variant.release().release)
    }

    /// Look for releases under another directory.
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.release
    }

    pub fn executable_name(&self) -> &'static str {
        self.variant.release().executable
    }

    /// `<prefix>/<release>/so64_dvpp[/<patch>]`. The patch applies to the
    /// stable release only.
    pub fn release_dir(&self) -> PathBuf {
        let info = self.variant.release();
        let base = self.prefix.join(&self.release).join("so64_dvpp");
        match info.patch {
            Some(patch) if self.release == info.release => base.join(patch),
            _ => base,
        }
    }

    pub fn executable_path(&self) -> PathBuf {
        self.release_dir().join(self.executable_name())
    }

    pub fn library_dirs(&self) -> Vec<PathBuf> {
        let dir = self.release_dir();
        RELEASE_LIBS
            .iter()
            .map(|lib| dir.join(format!("so64_{}", lib)))
            .collect()
    }

    /// Release directory, libraries and executable must all exist.
    pub fn check(&self) -> Result<()> {
        let dir = self.release_dir();
        if !dir.exists() {
            return Err(RegressError::config(format!("simulator release {} does not exist", self.release))
                .with_path(dir));
        }
        for (lib, path) in RELEASE_LIBS.iter().zip(self.library_dirs()) {
            if !path.exists() {
                return Err(RegressError::config(format!("simulator library {} missing", lib))
                    .with_path(path));
            }
        }
        let exe = self.executable_path();
        if !exe.exists() {
            return Err(RegressError::config("simulator executable missing").with_path(exe));
        }
        Ok(())
    }

    /// Replace the variant linkfarm's simulator link with this release.
    pub fn link(&self, layout: &BuildLayout) -> Result<PathBuf> {
        let link = layout.simulator_link(self.variant);
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link)?;
        }
        make_symlink(&self.executable_path(), &link)?;
        info!(link = %link.display(), release = %self.release, "linked simulator");
        Ok(link)
    }

    /// Environment the simulator needs: library search path and install dir.
    pub fn library_env(&self, layout: &BuildLayout) -> EnvOverrides {
        let mut dirs = layout.library_paths(self.variant);
        dirs.extend(self.library_dirs());
        EnvOverrides::new()
            .with("LD_LIBRARY_PATH", join_search_path(&dirs))
            .with("INSTALL_DIR_PATH", layout.spectra_root().to_string_lossy())
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| RegressError::from(e).with_path(link))
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(RegressError::config("simulator linking needs a unix host").with_path(link))
}

/// The variant's build output must hold every expected library.
pub fn check_build(layout: &BuildLayout, variant: HardwareVariant, ported: bool) -> Result<()> {
    let dir = layout.variant_libraries(variant);
    let extra: &[&str] = if ported { &PORTED_LIBS } else { &[] };
    for lib in BUILD_LIBS.iter().chain(extra) {
        let path = dir.join(format!("lib{}.so", lib));
        if !path.exists() {
            return Err(RegressError::config(format!("spectra library is missing ({})", lib))
                .with_path(path));
        }
    }
    Ok(())
}

/// One-line file holding the release used by the previous run.
#[derive(Debug, Clone)]
pub struct ReleaseMarker {
    path: PathBuf,
}

impl ReleaseMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Option<String> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let first = text.lines().next()?.trim();
        if first.is_empty() {
            None
        } else {
            Some(first.to_string())
        }
    }

    /// Store `release` unless it is already recorded. Returns whether the
    /// file changed.
    pub fn record(&self, release: &str) -> Result<bool> {
        if self.read().as_deref() == Some(release) {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, release)
            .map_err(|e| RegressError::from(e).with_path(&self.path))?;
        Ok(true)
    }
}

/// Explicit release, else the one recorded by the last run, else stable.
pub fn choose_release(
    variant: HardwareVariant,
    explicit: Option<&str>,
    marker: &ReleaseMarker,
) -> SimulatorRelease {
    if let Some(release) = explicit {
        return SimulatorRelease::new(variant, release);
    }
    match marker.read() {
        Some(release) => SimulatorRelease::new(variant, release),
        None => {
            warn!(variant = %variant, "no recorded simulator release, using stable");
            SimulatorRelease::stable(variant)
        }
    }
}
