// SPDX-License-Identifier: MIT

//! AppContainer launches.
//!
//! A container is identified by its name.  Initializing creates the OS
//! profile for that name, or opens it when it already exists, so repeated
//! runs always land on the same container SID.  Directory and registry
//! grants are applied once the SID is known, then the child is started with
//! the SID and capabilities attached to the process-creation request.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::capability::{CapabilityCatalog, CapabilitySet, WellKnownCapability};
use crate::command::{CommandDescriptor, CommandLine, VisibleMode};
use crate::error::{Diagnostic, Error, ErrorKind, Result};
use crate::manifest::{AppxManifest, ManifestSource};
use crate::platform::{
    Access, LaunchContext, NativePlatform, Platform, ProfileStore, ResourceGrantor, ResourceTarget,
};
use crate::sid::Sid;

const MAX_NAME_LEN: usize = 64;

/// An AppContainer profile known to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProfile {
    name: String,
    sid: Sid,
    folder: PathBuf,
    capabilities: CapabilitySet,
}

impl ContainerProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sid(&self) -> &Sid {
        &self.sid
    }

    /// The SID in `S-1-15-2-...` form.
    pub fn sid_string(&self) -> String {
        self.sid.to_string()
    }

    /// Private storage folder the OS assigned to the profile.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}


/// A registered grant, and the container SID it was last applied to.
#[derive(Debug, Clone)]
struct ResourceGrant {
    target: ResourceTarget,
    access: Access,
    applied_to: Option<Sid>,
}


/// Launch request for a command inside a named AppContainer.
pub struct AppContainer<P = NativePlatform> {
    descriptor: CommandDescriptor,
    name: String,
    catalog: CapabilityCatalog,
    grants: Vec<ResourceGrant>,
    grant_program_dir: bool,
    profile: Option<ContainerProfile>,
    diagnostic: Diagnostic,
    pid: u32,
    platform: P,
}

impl AppContainer<NativePlatform> {
    pub fn new(cmd: impl Into<CommandLine>) -> Self {
        Self::with_platform(cmd, NativePlatform::default())
    }

    /// Build the command line from the program and its arguments.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(CommandLine::from_args(args)?))
    }
}

impl<P: Platform> AppContainer<P> {
    pub fn with_platform(cmd: impl Into<CommandLine>, platform: P) -> Self {
        Self {
            descriptor: CommandDescriptor::new(cmd.into()),
            name: String::new(),
            catalog: CapabilityCatalog::new(),
            grants: vec![],
            grant_program_dir: false,
            profile: None,
            diagnostic: Diagnostic::default(),
            pid: 0,
            platform,
        }
    }

    pub fn commandline(&self) -> &CommandLine {
        &self.descriptor.commandline
    }

    pub fn commandline_mut(&mut self) -> &mut CommandLine {
        &mut self.descriptor.commandline
    }

    pub fn chdir(&mut self, dir: impl Into<PathBuf>) -> &Path {
        self.descriptor.cwd.insert(dir.into())
    }

    pub fn change_visible_mode(&mut self, visible: VisibleMode) -> VisibleMode {
        self.descriptor.visible = visible;
        visible
    }

    /// Set the container name, the unique key of the profile.
    pub fn set_name(&mut self, name: impl Into<String>) -> &str {
        self.name = name.into();
        &self.name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grant the container read-write access to a directory.
    pub fn allow_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.register(ResourceTarget::directory(dir), Access::ReadWrite)
    }

    /// Grant the container read and execute access to a directory.
    pub fn allow_readonly_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.register(ResourceTarget::directory(dir), Access::ReadExecute)
    }

    /// Grant the container read-write access to a registry key.
    pub fn allow_registry(&mut self, key: &str) -> &mut Self {
        self.register(ResourceTarget::registry(key), Access::ReadWrite)
    }

    /// Also grant read and execute access to the directory holding the program.
    pub fn allow_program_directory(&mut self, allow: bool) -> &mut Self {
        self.grant_program_dir = allow;
        self
    }

    /// Catalog used to resolve capability names; register extra names here.
    pub fn catalog_mut(&mut self) -> &mut CapabilityCatalog {
        &mut self.catalog
    }

    /// Create or open the profile with no capabilities.
    pub fn initialize_default(&mut self) -> bool {
        self.initialize(Ok(CapabilitySet::new()))
    }

    /// Create or open the profile with capabilities given by name.
    pub fn initialize_with_capability_names<S: AsRef<str>>(&mut self, names: &[S]) -> bool {
        let caps = CapabilitySet::from_names(&self.catalog, names);
        self.initialize(caps)
    }

    pub fn initialize_with_well_known(&mut self, ids: &[WellKnownCapability]) -> bool {
        self.initialize(Ok(CapabilitySet::from_well_known(ids)))
    }

    /// Create or open the profile with the capabilities a package manifest declares.
    pub fn initialize_from_manifest(&mut self, path: impl AsRef<Path>) -> bool {
        self.initialize_from_manifest_with(path, &AppxManifest)
    }

    pub fn initialize_from_manifest_with<M: ManifestSource + ?Sized>(
        &mut self,
        path: impl AsRef<Path>,
        manifest: &M,
    ) -> bool {
        let caps = manifest
            .capabilities(path.as_ref())
            .and_then(|names| CapabilitySet::from_names(&self.catalog, &names));
        self.initialize(caps)
    }

    /// Launch the command inside the initialized container.
    pub fn exec(&mut self) -> bool {
        self.diagnostic.clear();
        let result = self.try_exec();
        match result {
            Ok(pid) => {
                self.pid = pid;
                true
            }
            Err(e) => self.fail(e),
        }
    }

    /// Remove the OS profile for the configured name.
    pub fn delete_profile(&mut self) -> bool {
        self.diagnostic.clear();
        match self.platform.delete(&self.name) {
            Ok(()) => {
                info!("deleted AppContainer profile {}", self.name);
                self.profile = None;
                true
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn profile(&self) -> Option<&ContainerProfile> {
        self.profile.as_ref()
    }

    /// The container SID string, once initialized.
    pub fn sid_string(&self) -> Option<String> {
        self.profile.as_ref().map(ContainerProfile::sid_string)
    }

    pub fn folder(&self) -> Option<&Path> {
        self.profile.as_ref().map(ContainerProfile::folder)
    }

    /// Message for the last failure; empty when the last call succeeded.
    pub fn message(&self) -> &str {
        self.diagnostic.message()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.diagnostic.kind()
    }

    /// Process id of the launched child; 0 until a launch succeeds.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn register(&mut self, target: ResourceTarget, access: Access) -> &mut Self {
        let known = self.grants.iter().any(|g| g.target == target && g.access == access);
        if !known {
            self.grants.push(ResourceGrant { target, access, applied_to: None });
        }
        self
    }

    fn initialize(&mut self, caps: Result<CapabilitySet>) -> bool {
        self.diagnostic.clear();
        match caps.and_then(|caps| self.try_initialize(caps)) {
            Ok(()) => true,
            Err(e) => self.fail(e),
        }
    }

    fn try_initialize(&mut self, caps: CapabilitySet) -> Result<()> {
        self.profile = Some(open_profile(&self.platform, &self.name, caps)?);
        self.apply_grants()
    }

    fn try_exec(&mut self) -> Result<u32> {
        if self.profile.is_none() {
            return Err(Error::profile(&self.name, "not initialized"));
        }
        self.apply_grants()?;
        let Some(profile) = &self.profile else {
            return Err(Error::profile(&self.name, "not initialized"));
        };
        if self.grant_program_dir {
            grant_program_directory(&self.platform, profile.sid(), &self.descriptor.commandline)?;
        }
        launch_in_container(&self.platform, &self.descriptor, profile)
    }

    fn apply_grants(&mut self) -> Result<()> {
        let Some(profile) = &self.profile else {
            return Ok(());
        };
        let sid = profile.sid();
        for grant in self.grants.iter_mut().filter(|g| g.applied_to.as_ref() != Some(sid)) {
            self.platform.grant(sid, &grant.target, grant.access)?;
            info!("granted {:?} on {} to {}", grant.access, grant.target, profile.name());
            grant.applied_to = Some(sid.clone());
        }
        Ok(())
    }

    fn fail(&mut self, err: Error) -> bool {
        warn!("appcontainer {}: {err}", self.name);
        self.diagnostic.record(&err);
        false
    }
}


/// Container names are 1 to 64 characters of `[A-Za-z0-9._-]`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::profile(name, "container name is empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::profile(
            name,
            format!("container name is longer than {MAX_NAME_LEN} characters"),
        ));
    }
    let allowed = |c: &char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
    if let Some(bad) = name.chars().find(|c| !allowed(c)) {
        return Err(Error::profile(name, format!("invalid character {bad:?} in container name")));
    }
    Ok(())
}

/// Create or open the named profile and resolve its folder.
pub(crate) fn open_profile<S: ProfileStore + ?Sized>(
    store: &S,
    name: &str,
    capabilities: CapabilitySet,
) -> Result<ContainerProfile> {
    validate_name(name)?;
    let sid = store.create_or_open(name, &capabilities)?;
    let folder = store.folder_path(&sid)?;
    info!("AppContainer {name} ready as {sid} with {} capabilities", capabilities.len());
    Ok(ContainerProfile { name: name.to_string(), sid, folder, capabilities })
}

pub(crate) fn launch_in_container<P: Platform + ?Sized>(
    platform: &P,
    descriptor: &CommandDescriptor,
    profile: &ContainerProfile,
) -> Result<u32> {
    let pid = platform.launch(
        descriptor,
        LaunchContext::Container { sid: profile.sid(), capabilities: profile.capabilities() },
    )?;
    info!("launched pid {pid} in AppContainer {}", profile.name());
    Ok(pid)
}

fn grant_program_directory<G: ResourceGrantor + ?Sized>(
    grantor: &G,
    sid: &Sid,
    commandline: &CommandLine,
) -> Result<()> {
    let program = commandline.program();
    let found = match which::which(&program) {
        Ok(path) => path,
        Err(e) => {
            debug!("not granting the program directory; {program} not found: {e}");
            return Ok(());
        }
    };
    match found.parent() {
        Some(dir) => grantor.grant(sid, &ResourceTarget::directory(dir), Access::ReadExecute),
        None => Ok(()),
    }
}
