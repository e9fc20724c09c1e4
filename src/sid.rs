// SPDX-License-Identifier: MIT

//! Owned security identifiers.
//!
//! The OS hands out SIDs in memory that must be released with `FreeSid` or
//! `LocalFree`.  Rather than pass those pointers around, every SID the crate
//! keeps is copied into a [`Sid`], which owns its bytes.  Dropping a `Sid`
//! frees it, and nothing can free it twice.

use std::{fmt, str::FromStr};

use sha2::{Digest, Sha256};

const SID_REVISION: u8 = 1;
const MAX_SUB_AUTHORITIES: usize = 15;
const HEADER_LEN: usize = 8;

const NT_AUTHORITY: u64 = 5;
const MANDATORY_LABEL_AUTHORITY: u64 = 16;
const APP_PACKAGE_AUTHORITY: u64 = 15;

const SECURITY_LOCAL_SYSTEM_RID: u32 = 18;
const SECURITY_APP_PACKAGE_BASE_RID: u32 = 2;
const SECURITY_CAPABILITY_BASE_RID: u32 = 3;
const SECURITY_CAPABILITY_APP_RID: u32 = 1024;

/// A validated binary SID.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sid {
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SidParseError {
    #[error("not a SID string: '{0}'")]
    Format(String),
    #[error("SID has {0} sub-authorities, at most 15 are allowed")]
    TooManySubAuthorities(usize),
    #[error("malformed binary SID")]
    Binary,
}

impl Sid {
    /// Build a SID from its identifier authority and sub-authorities.
    pub fn from_parts(authority: u64, sub_authorities: &[u32]) -> Result<Self, SidParseError> {
        if sub_authorities.len() > MAX_SUB_AUTHORITIES {
            return Err(SidParseError::TooManySubAuthorities(sub_authorities.len()));
        }
        if authority >= 1 << 48 {
            return Err(SidParseError::Format(format!("authority {authority} out of range")));
        }
        let mut bytes = Vec::with_capacity(HEADER_LEN + 4 * sub_authorities.len());
        bytes.push(SID_REVISION);
        bytes.push(sub_authorities.len() as u8);
        // 48-bit authority, big-endian.
        bytes.extend_from_slice(&authority.to_be_bytes()[2..]);
        for sub in sub_authorities {
            bytes.extend_from_slice(&sub.to_le_bytes());
        }
        Ok(Self { bytes })
    }

    /// Copy a binary SID, validating its layout.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, SidParseError> {
        if raw.len() < HEADER_LEN || raw[0] != SID_REVISION {
            return Err(SidParseError::Binary);
        }
        let count = raw[1] as usize;
        if count > MAX_SUB_AUTHORITIES || raw.len() < HEADER_LEN + 4 * count {
            return Err(SidParseError::Binary);
        }
        Ok(Self { bytes: raw[..HEADER_LEN + 4 * count].to_vec() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn authority(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw[2..].copy_from_slice(&self.bytes[2..HEADER_LEN]);
        u64::from_be_bytes(raw)
    }

    pub fn sub_authorities(&self) -> Vec<u32> {
        self.bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// The last sub-authority.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities().last().copied()
    }

    /// `NT AUTHORITY\SYSTEM`.
    pub fn local_system() -> Self {
        Self::from_parts(NT_AUTHORITY, &[SECURITY_LOCAL_SYSTEM_RID])
            .expect("constant SID is well-formed")
    }

    /// Mandatory label SID, `S-1-16-<rid>`.
    pub fn mandatory_label(rid: u32) -> Self {
        Self::from_parts(MANDATORY_LABEL_AUTHORITY, &[rid])
            .expect("constant SID is well-formed")
    }

    /// Legacy capability SID, `S-1-15-3-<rid>`.
    pub fn capability(rid: u32) -> Self {
        Self::from_parts(APP_PACKAGE_AUTHORITY, &[SECURITY_CAPABILITY_BASE_RID, rid])
            .expect("constant SID is well-formed")
    }

    /// The SID the OS derives for an AppContainer name.
    ///
    /// SHA-256 over the lower-cased UTF-16LE name; the first 28 bytes become
    /// seven little-endian sub-authorities under `S-1-15-2`.
    pub fn derive_container(name: &str) -> Self {
        let digest = utf16_digest(&name.to_lowercase());
        let mut subs = vec![SECURITY_APP_PACKAGE_BASE_RID];
        subs.extend(digest_words(&digest).take(7));
        Self::from_parts(APP_PACKAGE_AUTHORITY, &subs).expect("derived SID is well-formed")
    }

    /// The SID the OS derives for a named capability.
    ///
    /// SHA-256 over the upper-cased UTF-16LE name, all eight words placed
    /// under `S-1-15-3-1024`.
    pub fn derive_capability(name: &str) -> Self {
        let digest = utf16_digest(&name.to_uppercase());
        let mut subs = vec![SECURITY_CAPABILITY_BASE_RID, SECURITY_CAPABILITY_APP_RID];
        subs.extend(digest_words(&digest));
        Self::from_parts(APP_PACKAGE_AUTHORITY, &subs).expect("derived SID is well-formed")
    }
}

fn utf16_digest(s: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for unit in s.encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    hasher.finalize().into()
}

fn digest_words(digest: &[u8; 32]) -> impl Iterator<Item = u32> + '_ {
    digest.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority = self.authority();
        write!(f, "S-{}-", self.bytes[0])?;
        if authority >= 1 << 32 {
            write!(f, "0x{authority:012X}")?;
        } else {
            write!(f, "{authority}")?;
        }
        for sub in self.sub_authorities() {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({self})")
    }
}

impl FromStr for Sid {
    type Err = SidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SidParseError::Format(s.to_string());
        let mut parts = s.trim().split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S")) {
            return Err(bad());
        }
        if parts.next() != Some("1") {
            return Err(bad());
        }
        let authority = match parts.next() {
            Some(p) if p.starts_with("0x") || p.starts_with("0X") => {
                u64::from_str_radix(&p[2..], 16).map_err(|_| bad())?
            }
            Some(p) => p.parse::<u64>().map_err(|_| bad())?,
            None => return Err(bad()),
        };
        let subs = parts
            .map(|p| p.parse::<u32>().map_err(|_| bad()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_parts(authority, &subs)
    }
}


/// Mandatory integrity levels, ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntegrityLevel {
    Untrusted,
    Low,
    Medium,
    MediumPlus,
    High,
    System,
    Protected,
}

impl IntegrityLevel {
    pub fn rid(self) -> u32 {
        match self {
            Self::Untrusted => 0x0000,
            Self::Low => 0x1000,
            Self::Medium => 0x2000,
            Self::MediumPlus => 0x2100,
            Self::High => 0x3000,
            Self::System => 0x4000,
            Self::Protected => 0x5000,
        }
    }

    /// Nearest level at or below the given label RID.
    pub fn from_rid(rid: u32) -> Self {
        match rid {
            r if r >= 0x5000 => Self::Protected,
            r if r >= 0x4000 => Self::System,
            r if r >= 0x3000 => Self::High,
            r if r >= 0x2100 => Self::MediumPlus,
            r if r >= 0x2000 => Self::Medium,
            r if r >= 0x1000 => Self::Low,
            _ => Self::Untrusted,
        }
    }

    pub fn label_sid(self) -> Sid {
        Sid::mandatory_label(self.rid())
    }
}
