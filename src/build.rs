//! Build driver
//!
//! Thin wrapper around the SDK build script and the parallel linkfarm build.

use std::path::Path;
use tracing::{info, warn};
use crate::error::Result;
use crate::layout::BuildLayout;
use crate::process::{EnvOverrides, Invocation};
use crate::variant::HardwareVariant;

/// Program that builds the x86_64 linkfarm.
pub const LINKFARM_BUILDER: &str = "mcp_ios_precommit";
pub const LINKFARM_TARGET: &str = "build_x86_64_binos_root";

#[derive(Debug, Clone)]
pub struct BuildDriver {
    layout: BuildLayout,
    /// Build the ported code base
    ported: bool,
    /// Build with call-flow instrumentation
    cflow: bool,
}

impl BuildDriver {
    pub fn new(layout: BuildLayout) -> Self {
        Self {
            layout,
            ported: false,
            cflow: false,
        }
    }

    pub fn ported(mut self, ported: bool) -> Self {
        self.ported = ported;
        self
    }

    pub fn cflow(mut self, cflow: bool) -> Self {
        self.cflow = cflow;
        self
    }

    fn script(&self, variant: HardwareVariant) -> Invocation {
        let inv = Invocation::new(self.layout.build_script())
            .current_dir(self.layout.root())
            .args(["-a".to_string(), variant.label()]);
        if self.cflow {
            inv.arg("-f")
        } else {
            inv
        }
    }

    /// Clean the variant build. The ported code base also drops its
    /// linkfarm; failing that step is only logged.
    pub fn clean(&self, variant: HardwareVariant) -> Result<()> {
        let clean = self.script(variant).args(["-c", "-o", "-q"]);
        info!(command = %clean.display(), "cleaning");
        clean.check()?;
        if self.ported {
            if let Err(e) = clean.arg("-p").check() {
                warn!("spectra clean failed: {}", e);
            }
        }
        Ok(())
    }

    pub fn build(&self, variant: HardwareVariant) -> Result<()> {
        let mut build = self.script(variant);
        if self.ported {
            build = build.arg("-p");
        }
        println!("Executing ({})", build.display());
        build.check()
    }

    pub fn clean_and_build(&self, variant: HardwareVariant) -> Result<()> {
        self.clean(variant)?;
        self.build(variant)
    }
}

/// Build the shared linkfarm from the `sys` directory of the ios tree.
pub fn build_linkfarm(ios_root: &Path, env: &EnvOverrides) -> Result<()> {
    let inv = Invocation::new(LINKFARM_BUILDER)
        .current_dir(ios_root.join("sys"))
        .env(env)
        .args(["--", "-j16", LINKFARM_TARGET]);
    println!("Executing ({})", inv.display());
    inv.check()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in build script that records its arguments.
    fn fake_script(layout: &BuildLayout, exit: i32) -> std::path::PathBuf {
        let script = layout.build_script();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        let record = layout.root().join("calls.txt");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" >> {}\nexit {}\n", record.display(), exit),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        record
    }

    #[test]
    fn test_clean_and_build_ported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(dir.path());
        let record = fake_script(&layout, 0);
        BuildDriver::new(layout)
            .ported(true)
            .cflow(true)
            .clean_and_build(HardwareVariant::D)
            .unwrap();
        let calls = std::fs::read_to_string(record).unwrap();
        assert_eq!(
            calls,
            "-a DopplerD -f -c -o -q\n-a DopplerD -f -c -o -q -p\n-a DopplerD -f -p\n"
        );
    }

    #[test]
    fn test_failed_build_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(dir.path());
        fake_script(&layout, 1);
        let err = BuildDriver::new(layout).build(HardwareVariant::CS).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ProcessFailed);
    }
}
