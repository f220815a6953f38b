//! Build-tree layout
//!
//! Every path the runner touches is derived from the build root
//! (`BINOS_ROOT`). Nothing here checks that the paths exist.

use std::path::{Path, PathBuf};
use crate::variant::HardwareVariant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sdk_root(&self) -> PathBuf {
        self.root.join("platforms/ngwc/doppler_sdk")
    }

    pub fn spectra_root(&self) -> PathBuf {
        self.sdk_root().join("spectra")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.spectra_root().join("scripts")
    }

    /// Directory tree holding one `<test>.py` per test
    pub fn test_suite_dir(&self) -> PathBuf {
        self.scripts_dir().join("test_suite")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.spectra_root().join("logs")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.spectra_root().join("results")
    }

    pub fn build_script(&self) -> PathBuf {
        self.sdk_root().join("tools/scripts/spectra_build.py")
    }

    pub fn build_logs_dir(&self) -> PathBuf {
        self.root.join("BUILD_LOGS")
    }

    /// Shared x86_64 linkfarm
    pub fn linkfarm(&self) -> PathBuf {
        self.root.join("linkfarm/x86_64")
    }

    pub fn variant_linkfarm(&self, variant: HardwareVariant) -> PathBuf {
        self.root
            .join(format!("linkfarm/x86_64-spectra{}", variant.code()))
    }

    pub fn variant_libraries(&self, variant: HardwareVariant) -> PathBuf {
        self.variant_linkfarm(variant).join("usr/binos/lib")
    }

    pub fn catalogue_path(&self, variant: HardwareVariant) -> Option<PathBuf> {
        variant
            .catalogue_stem()
            .map(|stem| self.scripts_dir().join(format!("{}_paq.regress", stem)))
    }

    /// One-line file remembering the last simulator release used
    pub fn release_marker(&self, variant: HardwareVariant) -> PathBuf {
        self.spectra_root()
            .join(format!(".spectra{}-dvpp", variant.code()))
    }

    pub fn simulator_link(&self, variant: HardwareVariant) -> PathBuf {
        self.variant_linkfarm(variant)
            .join("usr/binos/bin")
            .join(variant.release().executable)
    }

    pub fn python(&self) -> PathBuf {
        self.linkfarm().join("usr/bin/python2.7")
    }

    /// `<logs>/<test>.<code>.<FEATURE|>.log`
    pub fn test_log(&self, test: &str, variant: HardwareVariant, feature: bool) -> PathBuf {
        let mode = if feature { "FEATURE" } else { "" };
        self.logs_dir()
            .join(format!("{}.{}.{}.log", test, variant.code(), mode))
    }

    /// Linkfarm library directories needed by the simulator, in search order.
    pub fn library_paths(&self, variant: HardwareVariant) -> Vec<PathBuf> {
        let shared = self.linkfarm();
        let own = self.variant_linkfarm(variant);
        vec![
            shared.join("usr/lib"),
            shared.join("usr/binos/lib"),
            own.join("usr/binos/lib"),
            shared.join("usr/lib64"),
            shared.join("usr/binos/lib64"),
            own.join("usr/binos/lib64"),
            self.root.join("usr/binos/lib"),
            self.root.join("usr/lib"),
        ]
    }
}
