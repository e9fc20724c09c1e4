// SPDX-License-Identifier: MIT

//! Launching at each execution level.

use crate::ErrorKind;
use crate::level::{DEFAULT_DESKTOP, ExecutionLevel};
use crate::process::{DEFAULT_CONTAINER_NAME, Process};
use crate::sid::{IntegrityLevel, Sid};
use crate::token::{Donor, Privilege, TokenOrigin};

use super::fake::{FakePlatform, LaunchKind};
use super::util::init_logging;

#[test]
fn plain_launch_uses_the_caller_context() {
    init_logging();
    let platform = FakePlatform::user();
    let mut p = Process::with_platform("cmd.exe /c echo hi", platform.clone());
    p.chdir("C:\\Windows");

    assert!(p.exec(ExecutionLevel::None), "{}", p.message());
    assert_ne!(p.pid(), 0);
    assert_eq!(p.message(), "");

    let launch = platform.last_launch().unwrap();
    assert_eq!(launch.kind, LaunchKind::Caller);
    assert_eq!(launch.commandline, "cmd.exe /c echo hi");
    assert_eq!(launch.cwd.as_deref(), Some(std::path::Path::new("C:\\Windows")));
    assert_eq!(launch.pid, p.pid());
}

#[test]
fn low_integrity_notepad() {
    init_logging();
    let platform = FakePlatform::user();
    let mut p = Process::with_platform("notepad.exe", platform.clone());

    assert!(p.exec(ExecutionLevel::LowIntegrity), "{}", p.message());
    assert_ne!(p.pid(), 0);

    match platform.last_launch().unwrap().kind {
        LaunchKind::Token { origin, integrity, desktop, .. } => {
            assert_eq!(origin, TokenOrigin::Caller);
            assert_eq!(integrity, Some(IntegrityLevel::Low));
            assert_eq!(desktop, None);
        }
        other => panic!("unexpected launch {other:?}"),
    }
    assert_eq!(platform.state().open_tokens, 0);
}

#[test]
fn system_runs_with_the_winlogon_token_on_the_default_desktop() {
    init_logging();
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());

    assert!(p.exec(ExecutionLevel::System), "{}", p.message());

    match platform.last_launch().unwrap().kind {
        LaunchKind::Token { origin, owner, desktop, integrity, donor_pid, .. } => {
            assert_eq!(origin, TokenOrigin::Donor);
            assert_eq!(donor_pid, Some(600));
            assert_eq!(owner.as_deref(), Some(Sid::local_system().to_string().as_str()));
            assert_eq!(integrity, Some(IntegrityLevel::System));
            assert_eq!(desktop.as_deref(), Some(DEFAULT_DESKTOP));
        }
        other => panic!("unexpected launch {other:?}"),
    }
    let state = platform.state();
    assert!(state.enabled.contains(&Privilege::Debug));
    assert_eq!(state.open_tokens, 0);
}

#[test]
fn missing_donor_fails_and_keeps_the_previous_pid() {
    init_logging();
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    assert!(p.exec(ExecutionLevel::None));
    let first = p.pid();

    platform.state().donors.clear();
    assert!(!p.exec(ExecutionLevel::System));
    assert_eq!(p.error_kind(), Some(ErrorKind::NotFound));
    assert!(p.message().contains("winlogon.exe"), "{}", p.message());
    assert_eq!(p.pid(), first);
    assert_eq!(platform.state().launches.len(), 1);
}

#[test]
fn missing_shell_fails_deelevation() {
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    platform.state().donors.remove(&Donor::Shell.to_string());

    assert!(!p.exec(ExecutionLevel::NoElevated));
    assert_eq!(p.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(p.pid(), 0);
    let state = platform.state();
    assert!(state.launches.is_empty());
    assert_eq!(state.open_tokens, 0);
}

#[test]
fn trusted_installer_without_winlogon() {
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    assert!(p.exec(ExecutionLevel::None));
    let first = p.pid();
    platform.state().donors.remove(&Donor::WINLOGON.to_string());

    assert!(!p.exec(ExecutionLevel::TrustedInstaller));
    assert_eq!(p.error_kind(), Some(ErrorKind::NotFound));
    assert!(p.message().contains("winlogon.exe"), "{}", p.message());
    assert_eq!(p.pid(), first);
    let state = platform.state();
    assert!(state.service_starts.is_empty());
    assert!(!state.impersonating);
    assert_eq!(state.open_tokens, 0);
}

#[test]
fn donor_exiting_before_its_token_is_opened() {
    let platform = FakePlatform::admin();
    platform.state().donors_exit_after_lookup = true;
    let mut p = Process::with_platform("cmd.exe", platform.clone());

    assert!(!p.exec(ExecutionLevel::System));
    assert_eq!(p.error_kind(), Some(ErrorKind::ProcessOpen));
    assert!(p.message().contains("600"), "{}", p.message());
    assert_eq!(p.pid(), 0);
    let state = platform.state();
    assert!(state.launches.is_empty());
    assert_eq!(state.open_tokens, 0);
}

#[test]
fn success_clears_the_previous_message() {
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    platform.state().fail_launch = true;
    assert!(!p.exec(ExecutionLevel::None));
    assert_eq!(p.error_kind(), Some(ErrorKind::Launch));

    platform.state().fail_launch = false;
    assert!(p.exec(ExecutionLevel::None));
    assert_eq!(p.message(), "");
    assert_eq!(p.error_kind(), None);
}

#[test]
fn trusted_installer_without_debug_privilege() {
    init_logging();
    let platform = FakePlatform::user();
    let mut p = Process::with_platform("cmd.exe", platform.clone());

    assert!(!p.exec(ExecutionLevel::TrustedInstaller));
    assert_eq!(p.error_kind(), Some(ErrorKind::Privilege));
    assert!(p.message().contains("SeDebugPrivilege"), "{}", p.message());
    assert_eq!(p.pid(), 0);

    let state = platform.state();
    assert!(state.launches.is_empty());
    assert!(state.service_starts.is_empty());
    assert_eq!(state.open_tokens, 0);
}

#[test]
fn trusted_installer_starts_the_service_once() {
    init_logging();
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());

    assert!(p.exec(ExecutionLevel::TrustedInstaller), "{}", p.message());

    match platform.last_launch().unwrap().kind {
        LaunchKind::Token { origin, desktop, donor_pid, session_adopted, .. } => {
            assert_eq!(origin, TokenOrigin::Donor);
            assert_eq!(desktop.as_deref(), Some(DEFAULT_DESKTOP));
            assert!(session_adopted);
            // The service host's token, not the broker's.
            let service_pid = platform.state().donors["service TrustedInstaller"].0;
            assert_eq!(donor_pid, Some(service_pid));
            assert_ne!(donor_pid, Some(600));
        }
        other => panic!("unexpected launch {other:?}"),
    }
    let state = platform.state();
    assert_eq!(state.service_starts, vec!["TrustedInstaller".to_string()]);
    assert_eq!(state.adopted_sessions, 1);
    assert!(!state.impersonating);
    // The broker token is closed before the service token is opened.
    assert_eq!(state.max_open_tokens, 1);
    assert_eq!(state.open_tokens, 0);
}

#[test]
fn trusted_installer_tolerates_a_fixed_session() {
    let platform = FakePlatform::admin();
    platform.state().fail_adopt_session = true;
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    assert!(p.exec(ExecutionLevel::TrustedInstaller), "{}", p.message());
}

#[test]
fn trusted_installer_not_installed() {
    let platform = FakePlatform::admin();
    platform.state().services.clear();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    assert!(!p.exec(ExecutionLevel::TrustedInstaller));
    assert_eq!(p.error_kind(), Some(ErrorKind::Service));
    assert_eq!(platform.state().open_tokens, 0);
    assert!(!platform.state().impersonating);
}

#[test]
fn deelevate_uses_the_shell_token_when_elevated() {
    let platform = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    assert!(p.exec(ExecutionLevel::NoElevated), "{}", p.message());
    match platform.last_launch().unwrap().kind {
        LaunchKind::Token { origin, integrity, .. } => {
            assert_eq!(origin, TokenOrigin::Donor);
            assert_eq!(integrity, Some(IntegrityLevel::Medium));
        }
        other => panic!("unexpected launch {other:?}"),
    }
    assert!(!platform.state().enabled.contains(&Privilege::Debug));
}

#[test]
fn deelevate_is_a_plain_launch_when_not_elevated() {
    let platform = FakePlatform::user();
    let mut p = Process::with_platform("cmd.exe", platform.clone());
    assert!(p.exec(ExecutionLevel::NoElevated));
    assert_eq!(platform.last_launch().unwrap().kind, LaunchKind::Caller);
}

#[test]
fn elevate_prompts_only_when_needed() {
    let user = FakePlatform::user();
    let mut p = Process::with_platform("cmd.exe", user.clone());
    assert!(p.exec(ExecutionLevel::Elevated));
    assert_eq!(user.last_launch().unwrap().kind, LaunchKind::ElevationPrompt);

    let admin = FakePlatform::admin();
    let mut p = Process::with_platform("cmd.exe", admin.clone());
    assert!(p.exec(ExecutionLevel::Elevated));
    assert_eq!(admin.last_launch().unwrap().kind, LaunchKind::Caller);
}

#[test]
fn appcontainer_level_uses_the_default_profile() {
    let platform = FakePlatform::user();
    let mut p = Process::with_platform("notepad.exe", platform.clone());
    assert!(p.exec(ExecutionLevel::AppContainer), "{}", p.message());

    match platform.last_launch().unwrap().kind {
        LaunchKind::Container { sid, capabilities } => {
            assert_eq!(sid, Sid::derive_container(DEFAULT_CONTAINER_NAME));
            assert!(capabilities.is_empty());
        }
        other => panic!("unexpected launch {other:?}"),
    }
}

#[test]
fn every_level_leaves_no_open_tokens() {
    for level in [
        ExecutionLevel::None,
        ExecutionLevel::AppContainer,
        ExecutionLevel::LowIntegrity,
        ExecutionLevel::NoElevated,
        ExecutionLevel::Elevated,
        ExecutionLevel::System,
        ExecutionLevel::TrustedInstaller,
    ] {
        let platform = FakePlatform::admin();
        let mut p = Process::with_platform("cmd.exe", platform.clone());
        assert!(p.exec(level), "{level}: {}", p.message());
        assert_eq!(platform.state().open_tokens, 0, "{level}");

        platform.state().fail_launch = true;
        assert!(!p.exec(level), "{level}");
        assert_eq!(platform.state().open_tokens, 0, "{level}");
    }
}
