// SPDX-License-Identifier: MIT

//! Smoke tests against the running system.
//!
//! These start real processes (and some need an elevated administrator),
//! so they only run when asked for: `cargo test -- --ignored`.

use crate::command::VisibleMode;
use crate::container::AppContainer;
use crate::level::ExecutionLevel;
use crate::process::Process;

use super::util::init_logging;

const QUIET: &str = "cmd.exe /c exit 0";

#[test]
#[ignore]
fn runs_at_low_integrity() {
    init_logging();
    let mut p = Process::new(QUIET);
    p.change_visible_mode(VisibleMode::Hide);
    assert!(p.exec(ExecutionLevel::LowIntegrity), "{}", p.message());
    assert_ne!(p.pid(), 0);
}

#[test]
#[ignore]
fn runs_as_system() {
    init_logging();
    let mut p = Process::new(QUIET);
    p.change_visible_mode(VisibleMode::Hide);
    assert!(p.exec(ExecutionLevel::System), "{}", p.message());
}

#[test]
#[ignore]
fn runs_inside_a_sandbox_profile() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut ac = AppContainer::new(QUIET);
    ac.set_name("privexec.smoke.test");
    ac.change_visible_mode(VisibleMode::Hide);
    ac.allow_dir(dir.path());

    assert!(ac.initialize_with_capability_names(&["internetClient"]), "{}", ac.message());
    assert!(ac.sid_string().unwrap().starts_with("S-1-15-2-"));
    assert!(ac.exec(), "{}", ac.message());
    assert!(ac.delete_profile(), "{}", ac.message());
}
