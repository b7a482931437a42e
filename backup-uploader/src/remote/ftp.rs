//! `ftp://` store.
//!
//! Every operation runs on its own control connection: connect, log in,
//! switch to binary mode, change into the locator's directory, run one
//! command and quit. The directory is never created. `RNTO` over an existing
//! file is server dependent, so commits go through delete-then-rename.

use super::locator::{validate_name, RemoteLocator};
use super::{RemoteStore, StoreError, StoreResult};
use crate::utils::errors::BackupError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

#[derive(Debug, Clone)]
struct Session {
    address: String,
    user: String,
    password: String,
    directory: String,
    timeout: Duration,
}

pub struct FtpStore {
    locator: RemoteLocator,
    session: Session,
}

impl FtpStore {
    pub fn new(locator: RemoteLocator, timeout: Duration) -> Result<Self, BackupError> {
        let host = locator
            .host()
            .ok_or_else(|| BackupError::Config(format!("ftp locator has no host: {}", locator)))?;
        let port = locator.port().unwrap_or(21);

        let session = Session {
            address: format!("{}:{}", host, port),
            user: locator.username().unwrap_or(ANONYMOUS_USER).to_string(),
            password: locator.password().unwrap_or(ANONYMOUS_PASSWORD).to_string(),
            directory: locator.path().to_string(),
            timeout,
        };

        Ok(Self { locator, session })
    }

    /// Run `op` on a fresh, logged-in connection inside the target directory.
    async fn with_connection<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> StoreResult<T> + Send + 'static,
    {
        let session = self.session.clone();

        tokio::task::spawn_blocking(move || {
            let mut ftp = session.open()?;
            let result = op(&mut ftp);
            if let Err(e) = ftp.quit() {
                tracing::debug!("FTP QUIT failed: {}", e);
            }
            result
        })
        .await
        .map_err(|e| StoreError::Protocol(format!("ftp task failed: {}", e)))?
    }
}

impl Session {
    fn open(&self) -> StoreResult<FtpStream> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| StoreError::Protocol(format!("cannot resolve {}", self.address)))?;

        let mut ftp = FtpStream::connect_timeout(addr, self.timeout).map_err(|e| setup_error("connect", e))?;
        ftp.get_ref().set_read_timeout(Some(self.timeout))?;
        ftp.get_ref().set_write_timeout(Some(self.timeout))?;

        ftp.login(self.user.as_str(), self.password.as_str())
            .map_err(|e| setup_error("login", e))?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| setup_error("binary mode", e))?;
        ftp.cwd(self.directory.as_str())
            .map_err(|e| setup_error(&format!("directory {}", self.directory), e))?;

        Ok(ftp)
    }
}

fn setup_error(step: &str, err: FtpError) -> StoreError {
    match err {
        FtpError::ConnectionError(e) => StoreError::Io(e),
        other => StoreError::Protocol(format!("ftp {}: {}", step, other)),
    }
}

/// Map a command failure on object `name`; 550 means the file is not there.
fn object_error(name: &str, err: FtpError) -> StoreError {
    match err {
        FtpError::UnexpectedResponse(ref resp) if resp.status == Status::FileUnavailable => {
            StoreError::NotFound(name.to_string())
        }
        FtpError::ConnectionError(e) => StoreError::Io(e),
        other => StoreError::Protocol(format!("ftp `{}`: {}", name, other)),
    }
}

#[async_trait]
impl RemoteStore for FtpStore {
    fn describe(&self) -> String {
        self.locator.to_string()
    }

    async fn write(&self, name: &str, data: Bytes, overwrite: bool) -> StoreResult<u64> {
        validate_name(name)?;
        let name = name.to_string();

        self.with_connection(move |ftp| {
            if !overwrite && ftp.size(name.as_str()).is_ok() {
                return Err(StoreError::AlreadyExists(name));
            }
            let mut reader = Cursor::new(data);
            ftp.put_file(name.as_str(), &mut reader)
                .map_err(|e| object_error(&name, e))
        })
        .await
    }

    async fn read(&self, name: &str) -> StoreResult<Bytes> {
        validate_name(name)?;
        let name = name.to_string();

        self.with_connection(move |ftp| {
            ftp.retr_as_buffer(name.as_str())
                .map(|buffer| Bytes::from(buffer.into_inner()))
                .map_err(|e| object_error(&name, e))
        })
        .await
    }

    async fn delete_if_exists(&self, name: &str) -> StoreResult<()> {
        validate_name(name)?;
        let name = name.to_string();

        self.with_connection(move |ftp| match ftp.rm(name.as_str()) {
            Ok(()) => Ok(()),
            Err(e) => match object_error(&name, e) {
                StoreError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        })
        .await
    }

    async fn rename_or_replace(&self, from: &str, to: &str) -> StoreResult<()> {
        validate_name(from)?;
        validate_name(to)?;
        let (from, to) = (from.to_string(), to.to_string());

        self.with_connection(move |ftp| {
            ftp.rename(from.as_str(), to.as_str())
                .map_err(|e| object_error(&from, e))
        })
        .await
    }
}
