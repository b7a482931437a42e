//! Remote store locators: `scheme://[user[:password]@]host[:port]/path/`.
//!
//! A locator always names a directory. Object names are appended by the
//! core and may not contain path separators.

use super::StoreError;
use crate::utils::errors::BackupError;
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteLocator {
    url: Url,
}

impl RemoteLocator {
    pub fn parse(input: &str) -> Result<Self, BackupError> {
        let url = Url::parse(input)
            .map_err(|e| BackupError::Config(format!("invalid remote locator: {}", e)))?;

        if !url.path().ends_with('/') {
            return Err(BackupError::Config(format!(
                "remote locator must name a directory and end with '/': {}",
                Self::redact(&url)
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(BackupError::Config(
                "remote locator must not carry a query or fragment".to_string(),
            ));
        }

        Ok(Self { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn username(&self) -> Option<&str> {
        match self.url.username() {
            "" => None,
            user => Some(user),
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Explicit port, or the scheme's well-known one.
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// Directory path component of the locator.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Local directory for `file://` locators.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        self.url.to_file_path().ok()
    }

    /// URL of object `name` inside the directory, without credentials.
    pub fn object_url(&self, name: &str) -> Result<Url, StoreError> {
        validate_name(name)?;
        let mut base = self.url.clone();
        let _ = base.set_username("");
        let _ = base.set_password(None);
        base.join(name)
            .map_err(|e| StoreError::InvalidName(format!("{}: {}", name, e)))
    }

    fn redact(url: &Url) -> String {
        let mut shown = url.clone();
        if shown.password().is_some() {
            let _ = shown.set_password(Some("****"));
        }
        shown.to_string()
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::redact(&self.url))
    }
}

impl fmt::Debug for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteLocator({})", self)
    }
}

/// Object names are single path segments.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '\0') || c.is_control());

    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
