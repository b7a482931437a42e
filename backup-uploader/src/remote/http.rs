//! `http://` / `https://` store speaking plain WebDAV verbs.
//!
//! Objects are written with `PUT`, read back with `GET`, removed with
//! `DELETE` and promoted with `MOVE` + `Overwrite: T`. Credentials carried by
//! the locator are sent as basic auth and never appear in request URLs.

use super::locator::RemoteLocator;
use super::{RemoteStore, StoreError, StoreResult};
use crate::utils::errors::BackupError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::time::Duration;

pub struct HttpStore {
    client: Client,
    locator: RemoteLocator,
}

impl HttpStore {
    pub fn new(locator: RemoteLocator, timeout: Duration) -> Result<Self, BackupError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("backup-uploader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, locator })
    }

    fn request(&self, method: Method, name: &str) -> StoreResult<RequestBuilder> {
        let url = self.locator.object_url(name)?;
        let mut req = self.client.request(method, url);
        if let Some(user) = self.locator.username() {
            req = req.basic_auth(user, self.locator.password());
        }
        Ok(req)
    }
}

fn status_error(status: StatusCode, name: &str) -> StoreError {
    StoreError::Status {
        status: status.as_u16(),
        name: name.to_string(),
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    fn describe(&self) -> String {
        self.locator.to_string()
    }

    fn atomic_replace(&self) -> bool {
        true
    }

    async fn write(&self, name: &str, data: Bytes, overwrite: bool) -> StoreResult<u64> {
        let len = data.len() as u64;
        let resp = self
            .request(Method::PUT, name)?
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .body(data)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(len),
            StatusCode::PRECONDITION_FAILED => Err(StoreError::AlreadyExists(name.to_string())),
            s => Err(status_error(s, name)),
        }
    }

    async fn read(&self, name: &str) -> StoreResult<Bytes> {
        let resp = self.request(Method::GET, name)?.send().await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.bytes().await?),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(name.to_string())),
            s => Err(status_error(s, name)),
        }
    }

    async fn delete_if_exists(&self, name: &str) -> StoreResult<()> {
        let resp = self.request(Method::DELETE, name)?.send().await?;

        match resp.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(status_error(s, name)),
        }
    }

    async fn rename_or_replace(&self, from: &str, to: &str) -> StoreResult<()> {
        let method = Method::from_bytes(b"MOVE")
            .map_err(|e| StoreError::Protocol(format!("MOVE method unavailable: {}", e)))?;
        let destination = self.locator.object_url(to)?;

        let resp = self
            .request(method, from)?
            .header("Destination", destination.as_str())
            .header("Overwrite", "T")
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(from.to_string())),
            s => Err(status_error(s, from)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::routing::any;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

    async fn dav(
        State(objects): State<Objects>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let key = uri.path().to_string();
        let mut objects = objects.lock().unwrap();

        match method.as_str() {
            "PUT" => {
                objects.insert(key, body.to_vec());
                StatusCode::CREATED.into_response()
            }
            "GET" => match objects.get(&key) {
                Some(data) => data.clone().into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            },
            "DELETE" => match objects.remove(&key) {
                Some(_) => StatusCode::NO_CONTENT.into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            },
            "MOVE" => {
                let dest = headers
                    .get("destination")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<Uri>().ok());
                match dest {
                    Some(dest) => match objects.remove(&key) {
                        Some(data) => {
                            objects.insert(dest.path().to_string(), data);
                            StatusCode::CREATED.into_response()
                        }
                        None => StatusCode::NOT_FOUND.into_response(),
                    },
                    None => StatusCode::BAD_REQUEST.into_response(),
                }
            }
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }

    async fn spawn_server() -> (String, Objects) {
        let objects: Objects = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .route("/{*path}", any(dav))
            .with_state(objects.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://user:pw@{}/backups/", addr), objects)
    }

    #[tokio::test]
    async fn test_put_get_move_delete() {
        let (url, objects) = spawn_server().await;
        let store = HttpStore::new(RemoteLocator::parse(&url).unwrap(), Duration::from_secs(5)).unwrap();

        let written = store
            .write("job.zip.tmp", Bytes::from_static(b"archive"), true)
            .await
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(store.read("job.zip.tmp").await.unwrap(), Bytes::from_static(b"archive"));

        store.rename_or_replace("job.zip.tmp", "job.zip").await.unwrap();
        {
            let objects = objects.lock().unwrap();
            assert_eq!(objects.get("/backups/job.zip").map(Vec::as_slice), Some(&b"archive"[..]));
            assert!(!objects.contains_key("/backups/job.zip.tmp"));
        }

        store.delete_if_exists("job.zip").await.unwrap();
        store.delete_if_exists("job.zip").await.unwrap();
        assert!(matches!(store.read("job.zip").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let locator = RemoteLocator::parse("http://127.0.0.1:1/dir/").unwrap();
        let store = HttpStore::new(locator, Duration::from_secs(2)).unwrap();
        let err = store.write("x", Bytes::from_static(b"x"), true).await.unwrap_err();
        assert!(matches!(err, StoreError::Http(_)));
    }
}
