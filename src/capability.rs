// SPDX-License-Identifier: MIT

//! Capability names, well-known capability ids, and the set handed to an AppContainer.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::sid::Sid;

/// `SE_GROUP_ENABLED`; capabilities are always passed enabled.
pub const SE_GROUP_ENABLED: u32 = 0x0000_0004;

/// The capabilities that have fixed SIDs under `S-1-15-3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownCapability {
    InternetClient,
    InternetClientServer,
    PrivateNetworkClientServer,
    PicturesLibrary,
    VideosLibrary,
    MusicLibrary,
    DocumentsLibrary,
    EnterpriseAuthentication,
    SharedUserCertificates,
    RemovableStorage,
    Appointments,
    Contacts,
}

impl WellKnownCapability {
    pub const ALL: [WellKnownCapability; 12] = [
        Self::InternetClient,
        Self::InternetClientServer,
        Self::PrivateNetworkClientServer,
        Self::PicturesLibrary,
        Self::VideosLibrary,
        Self::MusicLibrary,
        Self::DocumentsLibrary,
        Self::EnterpriseAuthentication,
        Self::SharedUserCertificates,
        Self::RemovableStorage,
        Self::Appointments,
        Self::Contacts,
    ];

    pub fn rid(self) -> u32 {
        match self {
            Self::InternetClient => 1,
            Self::InternetClientServer => 2,
            Self::PrivateNetworkClientServer => 3,
            Self::PicturesLibrary => 4,
            Self::VideosLibrary => 5,
            Self::MusicLibrary => 6,
            Self::DocumentsLibrary => 7,
            Self::EnterpriseAuthentication => 8,
            Self::SharedUserCertificates => 9,
            Self::RemovableStorage => 10,
            Self::Appointments => 11,
            Self::Contacts => 12,
        }
    }

    /// The manifest name of the capability.
    pub fn name(self) -> &'static str {
        match self {
            Self::InternetClient => "internetClient",
            Self::InternetClientServer => "internetClientServer",
            Self::PrivateNetworkClientServer => "privateNetworkClientServer",
            Self::PicturesLibrary => "picturesLibrary",
            Self::VideosLibrary => "videosLibrary",
            Self::MusicLibrary => "musicLibrary",
            Self::DocumentsLibrary => "documentsLibrary",
            Self::EnterpriseAuthentication => "enterpriseAuthentication",
            Self::SharedUserCertificates => "sharedUserCertificates",
            Self::RemovableStorage => "removableStorage",
            Self::Appointments => "appointments",
            Self::Contacts => "contacts",
        }
    }

    pub fn sid(self) -> Sid {
        Sid::capability(self.rid())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }
}


/// Named capabilities without a legacy RID; their SIDs are derived from the name.
const DERIVED_CAPABILITIES: &[&str] = &[
    "lpacAppExperience",
    "lpacClipboard",
    "lpacCom",
    "lpacCryptoServices",
    "lpacDeviceAccess",
    "lpacEnterprisePolicyChangeNotifications",
    "lpacIdentityServices",
    "lpacInstrumentation",
    "lpacMedia",
    "lpacPackageManagerOperation",
    "lpacPayments",
    "lpacPnPNotifications",
    "lpacPrinting",
    "lpacServicesManagement",
    "lpacSessionManagement",
    "lpacWebPlatform",
    "registryRead",
    "runFullTrust",
    "broadFileSystemAccess",
    "userAccountInformation",
    "location",
    "webcam",
    "microphone",
    "bluetooth",
];


/// Maps a capability name to its SID.
pub trait CapabilityResolver {
    fn resolve(&self, name: &str) -> Result<Sid>;
}

/// The names this crate knows how to resolve.
///
/// Names are matched case-insensitively.  Names outside the catalog are
/// rejected rather than derived, so a typo never produces a capability SID
/// that nothing recognises.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    extra: HashMap<String, Sid>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name to the catalog, overriding any built-in resolution.
    pub fn register(&mut self, name: &str, sid: Sid) -> &mut Self {
        self.extra.insert(name.to_lowercase(), sid);
        self
    }

    /// Add a name whose SID is derived the way the OS derives named capabilities.
    pub fn register_derived(&mut self, name: &str) -> &mut Self {
        let sid = Sid::derive_capability(name);
        self.register(name, sid)
    }
}

impl CapabilityResolver for CapabilityCatalog {
    fn resolve(&self, name: &str) -> Result<Sid> {
        let name = name.trim();
        if let Some(sid) = self.extra.get(&name.to_lowercase()) {
            return Ok(sid.clone());
        }
        if let Some(cap) = WellKnownCapability::from_name(name) {
            return Ok(cap.sid());
        }
        if DERIVED_CAPABILITIES.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            return Ok(Sid::derive_capability(name));
        }
        Err(Error::UnknownCapability(name.to_string()))
    }
}


/// One capability entry: the SID and its group attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub sid: Sid,
    pub attributes: u32,
}

/// Insertion-ordered capabilities, unique by SID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every name; the first unknown name fails the whole set.
    pub fn from_names<R, S>(resolver: &R, names: &[S]) -> Result<Self>
    where
        R: CapabilityResolver + ?Sized,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            set.insert(resolver.resolve(name.as_ref())?);
        }
        Ok(set)
    }

    pub fn from_well_known(ids: &[WellKnownCapability]) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id.sid());
        }
        set
    }

    /// Add an enabled capability; returns false when the SID was already present.
    pub fn insert(&mut self, sid: Sid) -> bool {
        if self.contains(&sid) {
            return false;
        }
        self.entries.push(Capability { sid, attributes: SE_GROUP_ENABLED });
        true
    }

    pub fn contains(&self, sid: &Sid) -> bool {
        self.entries.iter().any(|c| &c.sid == sid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }
}
