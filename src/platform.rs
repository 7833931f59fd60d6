use crate::error::UploadError;
use crate::metadata::AnnotationValue;
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

/// Identifier of an entity (project, folder or file) on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteId(pub String);

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub id: RemoteId,
    pub name: String,
}

/// The remote platform, reduced to the calls this tool needs. Passed
/// explicitly through the run so tests can substitute a recording fake.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Exchange credentials for a session. Must be called before any other
    /// operation; a failure aborts the run.
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), UploadError>;

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, UploadError>;

    /// Create a folder under `parent`, or return the existing folder of the
    /// same name. The server guarantees idempotency per (parent, name).
    async fn create_folder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId, UploadError>;

    async fn upload_file(
        &self,
        parent: &RemoteId,
        local_path: &Path,
        name: &str,
        annotations: &BTreeMap<String, AnnotationValue>,
    ) -> Result<RemoteId, UploadError>;
}

/// reqwest-backed implementation against the platform's REST API.
pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct EntityResponse {
    id: String,
    #[serde(default)]
    name: String,
}

impl HttpPlatform {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| UploadError::remote("building HTTP client", err))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    fn bearer(&self) -> Result<String, UploadError> {
        self.token
            .read()
            .expect("token lock poisoned")
            .clone()
            .ok_or_else(|| UploadError::Authentication("not logged in".to_string()))
    }
}

async fn expect_success(
    response: Result<Response, reqwest::Error>,
    what: &str,
) -> Result<Response, UploadError> {
    let response = response.map_err(|err| UploadError::remote(what, err))?;
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UploadError::Authentication(
            format!("server rejected the session ({})", response.status()),
        )),
        StatusCode::NOT_FOUND => Err(UploadError::remote(
            what,
            format!("{} not found", response.url()),
        )),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(UploadError::remote(what, format!("{status}: {body}")))
        }
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), UploadError> {
        let response = self
            .client
            .post(self.endpoint("auth/login"))
            .json(&json!({
                "username": credentials.username,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|err| UploadError::Authentication(err.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Authentication(format!(
                "server returned {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| UploadError::Authentication(err.to_string()))?;
        *self.token.write().expect("token lock poisoned") = Some(body.token);
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, UploadError> {
        let what = format!("fetching project {project_id}");
        let response = self
            .client
            .get(self.endpoint(&format!("entity/{project_id}")))
            .bearer_auth(self.bearer()?)
            .send()
            .await;
        let body: EntityResponse = expect_success(response, &what)
            .await?
            .json()
            .await
            .map_err(|err| UploadError::remote(&what, err))?;
        Ok(ProjectInfo {
            id: RemoteId(body.id),
            name: body.name,
        })
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId, UploadError> {
        let what = format!("creating folder {name} under {parent}");
        let response = self
            .client
            .post(self.endpoint(&format!("entity/{parent}/folders")))
            .bearer_auth(self.bearer()?)
            .json(&json!({ "name": name }))
            .send()
            .await;
        let body: EntityResponse = expect_success(response, &what)
            .await?
            .json()
            .await
            .map_err(|err| UploadError::remote(&what, err))?;
        Ok(RemoteId(body.id))
    }

    async fn upload_file(
        &self,
        parent: &RemoteId,
        local_path: &Path,
        name: &str,
        annotations: &BTreeMap<String, AnnotationValue>,
    ) -> Result<RemoteId, UploadError> {
        let what = format!("uploading {}", local_path.display());
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|err| UploadError::remote(&what, err))?;

        let annotations_json = serde_json::to_string(annotations)
            .map_err(|err| UploadError::remote(&what, err))?;
        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(bytes).file_name(name.to_string()),
            )
            .text("name", name.to_string())
            .text("annotations", annotations_json);

        let response = self
            .client
            .post(self.endpoint(&format!("entity/{parent}/files")))
            .bearer_auth(self.bearer()?)
            .multipart(form)
            .send()
            .await;
        let body: EntityResponse = expect_success(response, &what)
            .await?
            .json()
            .await
            .map_err(|err| UploadError::remote(&what, err))?;
        Ok(RemoteId(body.id))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory platform that records every mutation, for orchestrator
    /// tests.
    #[derive(Default)]
    pub struct FakePlatform {
        pub reject_auth: bool,
        pub fail_uploads_named: Vec<String>,
        pub next_id: AtomicUsize,
        pub folder_calls: AtomicUsize,
        pub upload_calls: AtomicUsize,
        pub created_folders: Mutex<Vec<String>>,
        pub uploaded_names: Mutex<Vec<String>>,
    }

    impl FakePlatform {
        pub fn folder_call_count(&self) -> usize {
            self.folder_calls.load(Ordering::SeqCst)
        }

        pub fn upload_call_count(&self) -> usize {
            self.upload_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Platform for FakePlatform {
        async fn authenticate(&self, _credentials: &Credentials) -> Result<(), UploadError> {
            if self.reject_auth {
                return Err(UploadError::Authentication("invalid credentials".into()));
            }
            Ok(())
        }

        async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, UploadError> {
            Ok(ProjectInfo {
                id: RemoteId(project_id.to_string()),
                name: format!("project {project_id}"),
            })
        }

        async fn create_folder(
            &self,
            parent: &RemoteId,
            name: &str,
        ) -> Result<RemoteId, UploadError> {
            self.folder_calls.fetch_add(1, Ordering::SeqCst);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.created_folders
                .lock()
                .unwrap()
                .push(format!("{parent}/{name}"));
            Ok(RemoteId(format!("fld{id}")))
        }

        async fn upload_file(
            &self,
            _parent: &RemoteId,
            _local_path: &Path,
            name: &str,
            _annotations: &BTreeMap<String, AnnotationValue>,
        ) -> Result<RemoteId, UploadError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_uploads_named.iter().any(|n| n == name) {
                return Err(UploadError::remote(format!("uploading {name}"), "boom"));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.uploaded_names.lock().unwrap().push(name.to_string());
            Ok(RemoteId(format!("file{id}")))
        }
    }
}
