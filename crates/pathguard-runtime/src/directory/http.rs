//! Directory provider speaking the agent's file API.
//!
//! | Call | Request | Success body |
//! |------|---------|--------------|
//! | `list` | `POST /api/files/list {"path"}` | `{"success": true, "files": [...]}` |
//! | `search` | `POST /api/files/search {"path", "query"}` | `{"success": true, "results": [...]}` |
//! | `info` | `POST /api/files/info {"path"}` | one entry, bare or under `info`/`file` |
//! | `download` | `POST /api/files/download {"path", "compress"}` | raw bytes |
//! | `delete` | `POST /api/files/delete {"path"}` | `{"success": true}` |
//!
//! Failures come back as `{"success": false, "error": "..."}`, typically an
//! OS permission problem on the agent host.

use super::{DirEntry, DirectoryProvider};
use crate::transport::{truncate_for_error, Envelope, MAX_ERROR_BODY};
use crate::DirectoryError;
use async_trait::async_trait;
use pathguard_policy::CanonicalPath;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// HTTP client for one agent's file API.
#[derive(Debug, Clone)]
pub struct HttpDirectoryProvider {
    client: reqwest::Client,
    agent_url: String,
}

impl HttpDirectoryProvider {
    #[must_use]
    pub fn new(agent_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), agent_url)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, agent_url: impl Into<String>) -> Self {
        Self {
            client,
            agent_url: agent_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn agent_url(&self) -> &str {
        &self.agent_url
    }

    /// Posts `body` to `endpoint` and returns the raw body of a 2xx answer.
    async fn call<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Vec<u8>, DirectoryError> {
        let url = format!("{}/api/files/{endpoint}", self.agent_url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable {
                endpoint: url.clone(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| DirectoryError::Unreachable {
            endpoint: url.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(DirectoryError::Agent(Envelope::parse(&text).reason(&text)));
        }
        debug!(%url, status = status.as_u16(), "Agent answered");
        Ok(bytes.to_vec())
    }

    /// Like [`call`](Self::call), decoding a JSON answer and honouring
    /// `"success": false`.
    async fn call_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, DirectoryError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let bytes = self.call(endpoint, body).await?;
        let text = String::from_utf8_lossy(&bytes);
        refuse_failure(&text)?;
        serde_json::from_str(&text).map_err(|e| {
            DirectoryError::Codec(format!(
                "{e} in '{}'",
                truncate_for_error(&text, MAX_ERROR_BODY)
            ))
        })
    }
}

/// Maps a `{"success": false}` envelope to [`DirectoryError::Agent`].
fn refuse_failure(text: &str) -> Result<(), DirectoryError> {
    let envelope = Envelope::parse(text);
    if envelope.is_failure() {
        return Err(DirectoryError::Agent(envelope.reason(text)));
    }
    Ok(())
}

#[derive(Serialize)]
struct PathRequest<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    path: &'a str,
    query: &'a str,
}

#[derive(Serialize)]
struct DownloadRequest<'a> {
    path: &'a str,
    compress: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InfoResponse {
    Wrapped {
        #[serde(alias = "file")]
        info: AgentFile,
    },
    Bare(AgentFile),
}

impl From<InfoResponse> for DirEntry {
    fn from(resp: InfoResponse) -> Self {
        match resp {
            InfoResponse::Wrapped { info } | InfoResponse::Bare(info) => info.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<AgentFile>,
    #[serde(default)]
    results: Vec<AgentFile>,
}

/// Entry shape used by the agent (`can_*` are OS-level flags).
#[derive(Debug, Deserialize)]
struct AgentFile {
    name: String,
    path: String,
    #[serde(default)]
    is_directory: bool,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    can_read: bool,
    #[serde(default)]
    can_write: bool,
}

impl From<AgentFile> for DirEntry {
    fn from(f: AgentFile) -> Self {
        Self {
            name: f.name,
            path: f.path,
            is_directory: f.is_directory,
            size: f.size,
            modified: f.modified,
            os_readable: f.can_read,
            os_writable: f.can_write,
        }
    }
}

#[async_trait]
impl DirectoryProvider for HttpDirectoryProvider {
    async fn list(&self, path: &CanonicalPath) -> Result<Vec<DirEntry>, DirectoryError> {
        let resp: FilesResponse = self
            .call_json("list", &PathRequest {
                path: path.as_str(),
            })
            .await?;
        Ok(resp.files.into_iter().map(DirEntry::from).collect())
    }

    async fn search(
        &self,
        path: &CanonicalPath,
        query: &str,
    ) -> Result<Vec<DirEntry>, DirectoryError> {
        let resp: FilesResponse = self
            .call_json("search", &SearchRequest {
                path: path.as_str(),
                query,
            })
            .await?;
        Ok(resp.results.into_iter().map(DirEntry::from).collect())
    }

    async fn info(&self, path: &CanonicalPath) -> Result<DirEntry, DirectoryError> {
        let resp: InfoResponse = self
            .call_json("info", &PathRequest {
                path: path.as_str(),
            })
            .await?;
        Ok(resp.into())
    }

    async fn download(
        &self,
        path: &CanonicalPath,
        compress: bool,
    ) -> Result<Vec<u8>, DirectoryError> {
        let bytes = self
            .call("download", &DownloadRequest {
                path: path.as_str(),
                compress,
            })
            .await?;
        if bytes.is_empty() {
            return Err(DirectoryError::Agent(format!("empty download for '{path}'")));
        }
        // A JSON failure envelope is never a valid file body.
        if bytes.first() == Some(&b'{') {
            refuse_failure(&String::from_utf8_lossy(&bytes))?;
        }
        Ok(bytes)
    }

    async fn delete(&self, path: &CanonicalPath) -> Result<(), DirectoryError> {
        let bytes = self
            .call("delete", &PathRequest {
                path: path.as_str(),
            })
            .await?;
        refuse_failure(&String::from_utf8_lossy(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathguard_policy::normalize;

    #[test]
    fn agent_file_maps_os_flags() {
        let resp: FilesResponse = serde_json::from_str(
            r#"{"success":true,"path":"C:/","files":[
                {"name":"Users","path":"C:/Users","is_directory":true,"size":0,
                 "modified":"2024-01-01T00:00:00Z","file_type":"folder","can_read":true,"can_write":false}
            ]}"#,
        )
        .expect("decode listing");
        let entries: Vec<DirEntry> = resp.files.into_iter().map(DirEntry::from).collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_directory);
        assert!(entries[0].os_readable);
        assert!(!entries[0].os_writable);
    }

    #[test]
    fn info_accepts_bare_and_wrapped_entries() {
        let bare: InfoResponse =
            serde_json::from_str(r#"{"name":"a.txt","path":"/a.txt","size":3}"#).expect("bare");
        let wrapped: InfoResponse = serde_json::from_str(
            r#"{"success":true,"file":{"name":"a.txt","path":"/a.txt","size":3}}"#,
        )
        .expect("wrapped");
        assert_eq!(DirEntry::from(bare), DirEntry::from(wrapped));
    }

    #[test]
    fn failure_envelope_is_an_agent_error() {
        let err = refuse_failure(r#"{"success":false,"error":"Access is denied"}"#)
            .expect_err("failure");
        assert!(matches!(err, DirectoryError::Agent(ref m) if m == "Access is denied"));
        assert!(refuse_failure("plain text").is_ok());
    }

    #[tokio::test]
    async fn unreachable_agent() {
        let provider = HttpDirectoryProvider::new("http://127.0.0.1:1/");
        assert_eq!(provider.agent_url(), "http://127.0.0.1:1");
        let err = provider.list(&normalize("/")).await.expect_err("unreachable");
        assert!(matches!(err, DirectoryError::Unreachable { .. }));
    }
}
