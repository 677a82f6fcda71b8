pub mod chat;
pub mod readiness;
pub mod upload;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::db::{Database, Document};
use crate::error::{ServiceError, ServiceResult};
use crate::remote::RemoteClient;

/// Main service coordinator
pub struct ChatDocService {
    pub config: ServiceConfig,
    pub db: Arc<Database>,
    pub remote: RemoteClient,
    /// Per-document poll locks, so the interactive poll and the
    /// background worker never race on the same document's transition.
    pub(crate) poll_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ChatDocService {
    /// Create a new service instance
    pub async fn new(db: Arc<Database>, config: ServiceConfig) -> ServiceResult<Self> {
        info!("Initializing document chat service");

        let remote = RemoteClient::new(config.remote.clone())?;

        if remote.health_check().await {
            info!(url = %config.remote.base_url, "Remote processing service is available");
        } else {
            warn!(url = %config.remote.base_url, "Remote processing service is not available");
        }

        Ok(Self {
            config,
            db,
            remote,
            poll_locks: DashMap::new(),
        })
    }

    /// Load a document scoped to its owner. Missing documents and
    /// documents owned by someone else both surface as not-found.
    pub(crate) fn owned_document(&self, owner_id: &str, document_id: &str) -> ServiceResult<Document> {
        self.db
            .get_document_for_owner(document_id, owner_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    pub(crate) fn poll_lock(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.poll_locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Test fixture: in-memory database, temp storage dir, and a remote
    /// URL that refuses connections immediately.
    #[cfg(test)]
    pub(crate) fn for_tests() -> (Self, tempfile::TempDir) {
        Self::for_tests_with_remote("http://127.0.0.1:9")
    }

    /// Test fixture pointed at a specific remote endpoint, usually a
    /// [`stub_remote`] server.
    #[cfg(test)]
    pub(crate) fn for_tests_with_remote(base_url: &str) -> (Self, tempfile::TempDir) {
        use crate::config::RemoteConfig;

        let dir = tempfile::TempDir::new().unwrap();
        let config = ServiceConfig {
            storage: crate::config::StorageConfig {
                data_dir: dir.path().to_path_buf(),
            },
            remote: RemoteConfig {
                base_url: base_url.to_string(),
                ..RemoteConfig::default()
            },
            ..ServiceConfig::default()
        };
        let db = Arc::new(Database::open_in_memory().unwrap());
        let remote = RemoteClient::new(config.remote.clone()).unwrap();

        let service = Self {
            config,
            db,
            remote,
            poll_locks: DashMap::new(),
        };
        (service, dir)
    }
}

/// Minimal HTTP stub standing in for the remote processing service in
/// tests. Routes requests through a caller-supplied closure.
#[cfg(test)]
pub(crate) mod stub_remote {
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Spawn a one-off HTTP server; returns its base URL. The closure
    /// maps `(method, path)` to a JSON response body.
    pub async fn spawn<F>(respond: F) -> String
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 256 * 1024];
                    let mut read = 0;

                    // Read headers, then any body the client declared
                    let header_end = loop {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => read += n,
                        }
                        if let Some(pos) =
                            buf[..read].windows(4).position(|w| w == b"\r\n\r\n")
                        {
                            break pos + 4;
                        }
                        if read == buf.len() {
                            return;
                        }
                    };

                    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
                    let content_length = head
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    while read < header_end + content_length && read < buf.len() {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => read += n,
                        }
                    }

                    let mut parts = head.split_whitespace();
                    let method = parts.next().unwrap_or("").to_string();
                    let path = parts.next().unwrap_or("").to_string();

                    let body = respond(&method, &path);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }
}
