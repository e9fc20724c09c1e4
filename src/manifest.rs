// SPDX-License-Identifier: MIT

//! Capability names from an application package manifest.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Extracts the capability names declared by a manifest file.
pub trait ManifestSource {
    fn capabilities(&self, path: &Path) -> Result<Vec<String>>;
}

/// Reads `AppxManifest.xml` style package manifests.
///
/// Only the `Name` attribute of `Capability` elements is used, whatever the
/// namespace prefix (`uap:`, `rescap:`, ...).  Device capabilities are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppxManifest;

impl ManifestSource for AppxManifest {
    fn capabilities(&self, path: &Path) -> Result<Vec<String>> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        capability_names(&text).map_err(|reason| Error::ManifestParse {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Scan manifest text for capability names, in document order.
pub fn capability_names(text: &str) -> std::result::Result<Vec<String>, String> {
    let mut names = vec![];
    let mut saw_root = false;
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        // Comments, declarations, and processing instructions carry no elements.
        if let Some(body) = after.strip_prefix("!--") {
            let end = body.find("-->").ok_or("unterminated comment")?;
            rest = &body[end + 3..];
            continue;
        }
        let end = tag_end(after).ok_or("unterminated tag")?;
        let tag = &after[..end];
        rest = &after[end + 1..];
        if tag.starts_with('?') || tag.starts_with('!') || tag.starts_with('/') {
            continue;
        }
        saw_root = true;

        let element = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        let local = element.rsplit(':').next().unwrap_or(element);
        match local {
            "Capability" => match attribute(tag, "Name") {
                Some(name) if !name.is_empty() => names.push(name.to_string()),
                _ => return Err(format!("<{element}> without a Name attribute")),
            },
            "DeviceCapability" => {
                debug!("skipping device capability {:?}", attribute(tag, "Name"));
            }
            _ => (),
        }
    }

    if !saw_root {
        return Err("no root element".to_string());
    }
    Ok(names)
}

/// Offset of the `>` closing a tag, skipping quoted attribute values.
fn tag_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => (),
        }
    }
    None
}

/// Value of an attribute inside a start tag, accepting either quote style.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    while let Some(pos) = rest.find(name) {
        let before = rest[..pos].chars().last();
        let after = rest[pos + name.len()..].trim_start();
        rest = &rest[pos + name.len()..];
        if !before.is_some_and(char::is_whitespace) {
            continue;
        }
        let Some(value) = after.strip_prefix('=') else { continue };
        let value = value.trim_start();
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let body = &value[1..];
        return body.find(quote).map(|end| &body[..end]);
    }
    None
}
