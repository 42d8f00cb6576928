use super::token::TokenManager;
use super::{Provider, ResourceInfo};
use crate::config::{RemoteConfig, ServiceUser};
use crate::error::{IndexerError, Result};
use crate::link::join;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::IF_NONE_MATCH;
use reqwest::StatusCode as HttpStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the minted access token
pub const TOKEN_HEADER: &str = "x-access-token";

/// Status codes returned by the provider's container API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    #[serde(rename = "CODE_OK")]
    Ok,
    #[serde(rename = "CODE_NOT_FOUND")]
    NotFound,
    #[serde(rename = "CODE_ALREADY_EXISTS")]
    AlreadyExists,
    #[serde(rename = "CODE_PERMISSION_DENIED")]
    PermissionDenied,
    #[serde(rename = "CODE_UNAUTHENTICATED")]
    Unauthenticated,
    #[serde(rename = "CODE_INTERNAL")]
    Internal,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ProviderRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    status: Status,
    #[serde(default)]
    infos: Vec<ResourceInfo>,
    #[serde(default)]
    info: Option<ResourceInfo>,
}

/// Map a provider status onto the crate's path errors.
pub fn check_status(status: &Status, path: &str) -> Result<()> {
    match status.code {
        StatusCode::Ok => Ok(()),
        StatusCode::NotFound => Err(IndexerError::PathNotFound {
            path: path.to_string(),
        }),
        StatusCode::AlreadyExists => Err(IndexerError::PathExists {
            path: path.to_string(),
        }),
        code => Err(IndexerError::Remote {
            status: format!("{code:?}: {}", status.message),
            path: path.to_string(),
        }),
    }
}

fn check_http(status: HttpStatus, path: &str) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        HttpStatus::NOT_FOUND => Err(IndexerError::PathNotFound {
            path: path.to_string(),
        }),
        HttpStatus::PRECONDITION_FAILED => Err(IndexerError::PathExists {
            path: path.to_string(),
        }),
        s => Err(IndexerError::Remote {
            status: s.to_string(),
            path: path.to_string(),
        }),
    }
}

/// Talks to a storage provider: JSON container operations against
/// `provider_addr` and a simple PUT/GET data-plane under `data_url`.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    provider_addr: String,
    data_url: String,
    data_prefix: String,
    tokens: TokenManager,
}

impl HttpProvider {
    pub fn new(config: &RemoteConfig, user: &ServiceUser) -> Result<Self> {
        Self::with_builder(config, user, Client::builder())
    }

    /// Like `new`, starting from a preconfigured client builder (proxies, TLS).
    pub fn with_builder(
        config: &RemoteConfig,
        user: &ServiceUser,
        builder: ClientBuilder,
    ) -> Result<Self> {
        let client = builder
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(HttpProvider {
            client,
            provider_addr: config.provider_addr.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            data_prefix: config.data_prefix.clone(),
            tokens: TokenManager::new(config.jwt_secret.clone(), user.clone()),
        })
    }

    fn call(&self, op: &str, path: &str) -> Result<ProviderResponse> {
        let token = self.tokens.mint()?;
        let url = format!("{}/{op}", self.provider_addr);
        log::debug!("provider {op} {path}");

        let resp = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, token)
            .json(&ProviderRequest { path })
            .send()?;
        check_http(resp.status(), path)?;
        Ok(resp.json()?)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.data_url, join(&[self.data_prefix.as_str(), path]))
    }
}

impl Provider for HttpProvider {
    fn create_container(&self, path: &str) -> Result<()> {
        let res = self.call("create_container", path)?;
        match check_status(&res.status, path) {
            Err(IndexerError::PathExists { .. }) => Ok(()),
            other => other,
        }
    }

    fn list_container(&self, path: &str) -> Result<Vec<ResourceInfo>> {
        let res = self.call("list_container", path)?;
        check_status(&res.status, path)?;
        Ok(res.infos)
    }

    fn stat(&self, path: &str) -> Result<ResourceInfo> {
        let res = self.call("stat", path)?;
        check_status(&res.status, path)?;
        res.info.ok_or_else(|| IndexerError::Remote {
            status: "stat response without info".into(),
            path: path.to_string(),
        })
    }

    fn delete(&self, path: &str) -> Result<()> {
        let res = self.call("delete", path)?;
        check_status(&res.status, path)
    }

    fn upload(&self, path: &str, content: &[u8], if_none_match: bool) -> Result<()> {
        let token = self.tokens.mint()?;
        let mut req = self
            .client
            .put(self.object_url(path))
            .header(TOKEN_HEADER, token)
            .body(content.to_vec());
        if if_none_match {
            req = req.header(IF_NONE_MATCH, "*");
        }
        log::debug!("upload {path} ({} bytes)", content.len());
        let resp = req.send()?;
        check_http(resp.status(), path)
    }

    fn download(&self, path: &str) -> Result<Vec<u8>> {
        let token = self.tokens.mint()?;
        let resp = self
            .client
            .get(self.object_url(path))
            .header(TOKEN_HEADER, token)
            .send()?;
        check_http(resp.status(), path)?;
        Ok(resp.bytes()?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let ok = Status {
            code: StatusCode::Ok,
            message: String::new(),
        };
        assert!(check_status(&ok, "a").is_ok());

        let missing = Status {
            code: StatusCode::NotFound,
            message: "gone".into(),
        };
        assert!(check_status(&missing, "a").unwrap_err().is_not_found());

        let denied = Status {
            code: StatusCode::PermissionDenied,
            message: "nope".into(),
        };
        assert!(matches!(
            check_status(&denied, "a"),
            Err(IndexerError::Remote { .. })
        ));
    }

    #[test]
    fn test_unknown_status_code_deserializes() {
        let status: Status =
            serde_json::from_str(r#"{"code": "CODE_SOMETHING_NEW", "message": "x"}"#).unwrap();
        assert_eq!(status.code, StatusCode::Unknown);
    }

    #[test]
    fn test_http_status_mapping() {
        assert!(check_http(HttpStatus::CREATED, "a").is_ok());
        assert!(check_http(HttpStatus::NOT_FOUND, "a").unwrap_err().is_not_found());
        assert!(check_http(HttpStatus::PRECONDITION_FAILED, "a")
            .unwrap_err()
            .is_already_exists());
        assert!(matches!(
            check_http(HttpStatus::UNAUTHORIZED, "a"),
            Err(IndexerError::Remote { .. })
        ));
    }

    /// A one-request-per-connection HTTP server answering with canned responses.
    mod fake {
        use std::collections::HashMap;
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::TcpListener;
        use std::sync::mpsc;
        use std::thread;

        #[derive(Debug)]
        pub struct Request {
            pub method: String,
            pub path: String,
            pub headers: HashMap<String, String>,
            pub body: String,
        }

        pub fn serve(responses: Vec<(u16, String)>) -> (String, mpsc::Receiver<Request>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}", listener.local_addr().unwrap());
            let (tx, rx) = mpsc::channel();

            thread::spawn(move || {
                for (status, body) in responses {
                    let (stream, _) = listener.accept().unwrap();
                    let mut reader = BufReader::new(stream);

                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let mut parts = line.split_whitespace();
                    let method = parts.next().unwrap_or_default().to_string();
                    let path = parts.next().unwrap_or_default().to_string();

                    let mut headers = HashMap::new();
                    loop {
                        let mut header = String::new();
                        reader.read_line(&mut header).unwrap();
                        let header = header.trim_end();
                        if header.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = header.split_once(':') {
                            headers
                                .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                        }
                    }
                    let len = headers
                        .get("content-length")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    let mut raw = vec![0; len];
                    reader.read_exact(&mut raw).unwrap();

                    tx.send(Request {
                        method,
                        path,
                        headers,
                        body: String::from_utf8_lossy(&raw).into_owned(),
                    })
                    .unwrap();

                    let mut stream = reader.into_inner();
                    write!(
                        stream,
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    )
                    .unwrap();
                }
            });

            (addr, rx)
        }
    }

    const SECRET: &str = "test-secret";

    fn provider_for(addr: &str) -> HttpProvider {
        let config = RemoteConfig {
            provider_addr: addr.to_string(),
            data_url: addr.to_string(),
            data_prefix: "data".into(),
            jwt_secret: SECRET.into(),
            timeout_secs: 5,
        };
        HttpProvider::with_builder(&config, &ServiceUser::default(), Client::builder().no_proxy())
            .unwrap()
    }

    fn assert_signed(req: &fake::Request) {
        let token = req.headers.get(TOKEN_HEADER).expect("token header");
        let claims = TokenManager::new(SECRET, ServiceUser::default())
            .verify(token)
            .unwrap();
        assert_eq!(claims.sub, ServiceUser::default().id);
    }

    #[test]
    fn test_container_calls_over_http() {
        let listing = r#"{"status": {"code": "CODE_OK"}, "infos": [
            {"path": "/index.cs3/unique.a.B/x", "type": "file", "size": 13},
            {"path": "/index.cs3/unique.a.B/y", "type": "container"}
        ]}"#;
        let (addr, requests) = fake::serve(vec![
            (200, listing.to_string()),
            (200, r#"{"status": {"code": "CODE_ALREADY_EXISTS"}}"#.to_string()),
            (200, r#"{"status": {"code": "CODE_NOT_FOUND", "message": "gone"}}"#.to_string()),
            (404, String::new()),
        ]);
        let provider = provider_for(&addr);

        let infos = provider.list_container("index.cs3/unique.a.B").unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].path, "/index.cs3/unique.a.B/x");
        assert_eq!(infos[0].size, 13);
        assert_eq!(infos[1].resource_type, crate::link::remote::ResourceType::Container);

        let req = requests.recv().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/list_container");
        assert_eq!(
            req.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body, serde_json::json!({"path": "index.cs3/unique.a.B"}));
        assert_signed(&req);

        provider.create_container("index.cs3").unwrap();
        assert_eq!(requests.recv().unwrap().path, "/create_container");

        assert!(provider.stat("index.cs3/missing").unwrap_err().is_not_found());
        assert_eq!(requests.recv().unwrap().path, "/stat");

        assert!(provider.delete("index.cs3/missing").unwrap_err().is_not_found());
        assert_eq!(requests.recv().unwrap().path, "/delete");
    }

    #[test]
    fn test_data_plane_over_http() {
        let (addr, requests) = fake::serve(vec![
            (201, String::new()),
            (412, String::new()),
            (200, "meta/users/u1".to_string()),
            (404, String::new()),
        ]);
        let provider = provider_for(&addr);
        let link = "index.cs3/unique.a.B/x";

        provider.upload(link, b"meta/users/u1", false).unwrap();
        let req = requests.recv().unwrap();
        assert_eq!(req.method, "PUT");
        assert_eq!(req.path, "/data/index.cs3/unique.a.B/x");
        assert_eq!(req.body, "meta/users/u1");
        assert!(!req.headers.contains_key("if-none-match"));
        assert_signed(&req);

        let err = provider.upload(link, b"meta/users/u2", true).unwrap_err();
        assert!(matches!(err, IndexerError::PathExists { .. }));
        let req = requests.recv().unwrap();
        assert_eq!(req.headers.get("if-none-match").map(String::as_str), Some("*"));

        assert_eq!(provider.download(link).unwrap(), b"meta/users/u1");
        let req = requests.recv().unwrap();
        assert_eq!(req.method, "GET");
        assert_signed(&req);

        assert!(matches!(
            provider.download(link),
            Err(IndexerError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_object_url() {
        let provider = HttpProvider::new(
            &RemoteConfig {
                provider_addr: "http://p:1/".into(),
                data_url: "http://d:2/".into(),
                data_prefix: "data".into(),
                jwt_secret: "s".into(),
                timeout_secs: 5,
            },
            &ServiceUser::default(),
        )
        .unwrap();
        assert_eq!(
            provider.object_url("index.cs3/unique.a.B/x"),
            "http://d:2/data/index.cs3/unique.a.B/x"
        );
    }
}
