// SPDX-License-Identifier: MIT

//! AppContainer profiles, grants, and launches.

use std::io::Write;

use crate::capability::{CapabilitySet, WellKnownCapability};
use crate::container::AppContainer;
use crate::platform::{Access, ResourceTarget};
use crate::sid::Sid;
use crate::ErrorKind;

use super::fake::{FakePlatform, LaunchKind};
use super::util::init_logging;

fn container(platform: &FakePlatform, name: &str) -> AppContainer<FakePlatform> {
    let mut ac = AppContainer::with_platform("sandboxed.exe --flag", platform.clone());
    ac.set_name(name);
    ac
}

#[test]
fn sandbox_with_internet_client_and_a_writable_dir() {
    init_logging();
    let platform = FakePlatform::user();
    let dir = tempfile::tempdir().unwrap();
    let mut ac = container(&platform, "sandbox.test");

    ac.allow_dir(dir.path());
    assert!(ac.initialize_with_capability_names(&["internetClient"]), "{}", ac.message());
    assert!(ac.exec(), "{}", ac.message());
    assert_ne!(ac.pid(), 0);

    let expected_sid = Sid::derive_container("sandbox.test");
    assert_eq!(ac.sid_string(), Some(expected_sid.to_string()));
    assert!(ac.sid_string().unwrap().starts_with("S-1-15-2-"));
    assert!(ac.folder().is_some());

    let state = platform.state();
    assert!(state.acl.contains(&(
        expected_sid.clone(),
        ResourceTarget::directory(dir.path()),
        Access::ReadWrite,
    )));
    match &state.launches.last().unwrap().kind {
        LaunchKind::Container { sid, capabilities } => {
            assert_eq!(sid, &expected_sid);
            assert_eq!(capabilities.len(), 1);
            assert!(capabilities.contains(&WellKnownCapability::InternetClient.sid()));
            assert_eq!(WellKnownCapability::InternetClient.sid().to_string(), "S-1-15-3-1");
        }
        other => panic!("unexpected launch {other:?}"),
    }
}

#[test]
fn names_and_ids_produce_the_same_profile_capabilities() {
    let platform = FakePlatform::user();

    let mut by_name = container(&platform, "by.name");
    assert!(by_name.initialize_with_capability_names(&["internetClient", "picturesLibrary"]));
    let mut by_id = container(&platform, "by.id");
    assert!(by_id.initialize_with_well_known(&[
        WellKnownCapability::InternetClient,
        WellKnownCapability::PicturesLibrary,
    ]));

    assert_eq!(
        by_name.profile().unwrap().capabilities(),
        by_id.profile().unwrap().capabilities(),
    );
}

#[test]
fn reinitializing_reuses_the_profile() {
    let platform = FakePlatform::user();
    let mut first = container(&platform, "reused.profile");
    assert!(first.initialize_default());
    let sid = first.sid_string().unwrap();

    let mut second = container(&platform, "reused.profile");
    assert!(second.initialize_with_capability_names(&["internetClient"]));
    assert_eq!(second.sid_string().unwrap(), sid);
    assert!(first.initialize_default());
    assert_eq!(first.sid_string().unwrap(), sid);
    assert_eq!(platform.state().profile_creates, 1);
}

#[test]
fn unknown_capability_creates_no_profile() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "typo.profile");

    assert!(!ac.initialize_with_capability_names(&["internetClient", "internetClinet"]));
    assert_eq!(ac.error_kind(), Some(ErrorKind::UnknownCapability));
    assert!(ac.message().contains("internetClinet"), "{}", ac.message());
    assert!(ac.profile().is_none());
    assert_eq!(platform.state().profile_creates, 0);
    assert!(platform.state().profiles.is_empty());
}

#[test]
fn registered_capability_names_resolve() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "custom.caps");
    ac.catalog_mut().register_derived("vendorSpecial");
    assert!(ac.initialize_with_capability_names(&["vendorSpecial"]), "{}", ac.message());
    let vendor = Sid::derive_capability("vendorSpecial");
    assert!(ac.profile().unwrap().capabilities().contains(&vendor));
}

#[test]
fn grants_are_idempotent() {
    let platform = FakePlatform::user();
    let dir = tempfile::tempdir().unwrap();
    let mut ac = container(&platform, "grants.twice");

    ac.allow_dir(dir.path());
    ac.allow_dir(dir.path());
    assert!(ac.initialize_default());
    assert!(ac.exec());
    assert!(ac.exec());
    assert_eq!(platform.state().grant_calls, 1);

    // A second entity granting the same thing leaves the same ACL.
    let mut again = container(&platform, "grants.twice");
    again.allow_dir(dir.path());
    assert!(again.initialize_default());
    let state = platform.state();
    assert_eq!(state.grant_calls, 2);
    assert_eq!(state.acl.len(), 1);
}

#[test]
fn grants_registered_after_initialize_apply_at_exec() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "late.grants");
    assert!(ac.initialize_default());
    assert_eq!(platform.state().grant_calls, 0);

    ac.allow_readonly_dir("C:\\Tools");
    ac.allow_registry("HKCU\\Software\\Vendor");
    assert!(ac.exec(), "{}", ac.message());

    let sid = Sid::derive_container("late.grants");
    let state = platform.state();
    let tools = ResourceTarget::directory("C:\\Tools");
    assert!(state.acl.contains(&(sid.clone(), tools, Access::ReadExecute)));
    assert!(state.acl.contains(&(
        sid,
        ResourceTarget::RegistryKey("CURRENT_USER\\Software\\Vendor".to_string()),
        Access::ReadWrite,
    )));
}

#[test]
fn exec_requires_initialize() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "not.ready");
    ac.allow_dir("C:\\Data");
    assert!(!ac.exec());
    assert_eq!(ac.error_kind(), Some(ErrorKind::Profile));
    assert_eq!(ac.pid(), 0);
    let state = platform.state();
    assert!(state.launches.is_empty());
    assert_eq!(state.grant_calls, 0);
}

#[test]
fn invalid_name_is_rejected_before_the_os_is_asked() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "bad name");
    assert!(!ac.initialize_default());
    assert_eq!(ac.error_kind(), Some(ErrorKind::Profile));
    assert_eq!(platform.state().profile_creates, 0);
}

#[test]
fn failed_launch_keeps_the_previous_pid() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "relaunch");
    assert!(ac.initialize_default());
    assert!(ac.exec());
    let pid = ac.pid();

    platform.state().fail_launch = true;
    assert!(!ac.exec());
    assert_eq!(ac.pid(), pid);
    assert_eq!(ac.error_kind(), Some(ErrorKind::Launch));
}

#[test]
fn initialize_from_manifest() {
    let platform = FakePlatform::user();
    let mut manifest = tempfile::NamedTempFile::new().unwrap();
    write!(
        manifest,
        r#"<?xml version="1.0"?>
<Package><Capabilities>
  <Capability Name="internetClient"/>
  <Capability Name="documentsLibrary"/>
</Capabilities></Package>"#
    )
    .unwrap();

    let mut ac = container(&platform, "from.manifest");
    assert!(ac.initialize_from_manifest(manifest.path()), "{}", ac.message());
    let expected = CapabilitySet::from_well_known(&[
        WellKnownCapability::InternetClient,
        WellKnownCapability::DocumentsLibrary,
    ]);
    assert_eq!(ac.profile().unwrap().capabilities(), &expected);
}

#[test]
fn unreadable_manifest_fails() {
    let platform = FakePlatform::user();
    let dir = tempfile::tempdir().unwrap();
    let mut ac = container(&platform, "no.manifest");
    assert!(!ac.initialize_from_manifest(dir.path().join("AppxManifest.xml")));
    assert_eq!(ac.error_kind(), Some(ErrorKind::ManifestParse));
    assert_eq!(platform.state().profile_creates, 0);
}

#[test]
fn delete_profile_forgets_it() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "short.lived");
    assert!(ac.initialize_default());
    assert!(ac.delete_profile());
    assert!(ac.profile().is_none());
    assert!(platform.state().profiles.is_empty());

    assert!(!ac.delete_profile());
    assert_eq!(ac.error_kind(), Some(ErrorKind::Profile));
}

#[test]
fn renamed_profile_receives_the_registered_grants() {
    let platform = FakePlatform::user();
    let dir = tempfile::tempdir().unwrap();
    let mut ac = container(&platform, "first.name");
    ac.allow_dir(dir.path());
    assert!(ac.initialize_default());

    ac.set_name("second.name");
    assert!(ac.initialize_default());
    assert!(ac.exec(), "{}", ac.message());

    let second = Sid::derive_container("second.name");
    let state = platform.state();
    assert!(state.acl.contains(&(
        Sid::derive_container("first.name"),
        ResourceTarget::directory(dir.path()),
        Access::ReadWrite,
    )));
    let target = ResourceTarget::directory(dir.path());
    assert!(state.acl.contains(&(second.clone(), target, Access::ReadWrite)));
    match &state.launches.last().unwrap().kind {
        LaunchKind::Container { sid, .. } => assert_eq!(sid, &second),
        other => panic!("unexpected launch {other:?}"),
    }
    assert_eq!(state.grant_calls, 2);
}

#[test]
fn grants_follow_the_profile_after_delete() {
    let platform = FakePlatform::user();
    let mut ac = container(&platform, "old.profile");
    ac.allow_registry("HKLM\\Software\\Vendor");
    assert!(ac.initialize_default());
    assert!(ac.delete_profile());

    ac.set_name("new.profile");
    assert!(ac.initialize_default());
    assert!(platform.state().acl.contains(&(
        Sid::derive_container("new.profile"),
        ResourceTarget::RegistryKey("MACHINE\\Software\\Vendor".to_string()),
        Access::ReadWrite,
    )));
}
