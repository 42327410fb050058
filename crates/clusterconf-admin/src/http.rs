//! HTTP implementation of [`AdminApi`]

use crate::api::{
    AdminApi, ConfigResponse, MemberResponse, PatchAccepted, PatchOutcome, PatchRejected, PatchRequest,
    SchemaResponse, WriteMode,
};
use crate::config::{ClientConfig, TlsConfig};
use crate::error::AdminError;
use async_trait::async_trait;
use clusterconf_core::{NodeId, NodeStatus, PropertyDefinition};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Admin API client over HTTP(S)
///
/// Hosts are tried in order; a connect failure or timeout on one host moves
/// on to the next before the call counts as failed.
#[derive(Debug, Clone)]
pub struct HttpAdminClient {
    hosts: Vec<String>,
    http: Client,
}

impl HttpAdminClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// - `AdminError::InvalidUrl` if no host is configured or one cannot be parsed
    /// - `AdminError::Tls` if TLS material cannot be read
    pub fn new(config: &ClientConfig) -> Result<Self, AdminError> {
        if config.hosts.is_empty() {
            return Err(AdminError::InvalidUrl("no admin API hosts configured".to_string()));
        }
        let scheme = if config.tls.enabled { "https" } else { "http" };
        let hosts = config
            .hosts
            .iter()
            .map(|host| normalize_host(host, scheme))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = Client::builder().timeout(config.request_timeout());
        if config.tls.enabled {
            builder = configure_tls(builder.use_rustls_tls(), &config.tls)?;
        }
        let http = builder.build().map_err(|e| AdminError::Tls(e.to_string()))?;

        tracing::debug!(?hosts, tls = config.tls.enabled, "admin client ready");
        Ok(Self { hosts, http })
    }

    /// Base URLs in the order they are tried
    #[inline]
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    fn url(host: &str, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/{}", host.trim_end_matches('/'), path)
    }

    /// Send to the first host that accepts the connection
    async fn send<F>(&self, path: &str, build: F) -> Result<Response, AdminError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let mut last_error = None;
        for host in &self.hosts {
            let url = Self::url(host, path);
            tracing::debug!(%url, "admin request");
            match build(&self.http, &url).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let failover = e.is_connect() || e.is_timeout();
                    let error = AdminError::Unreachable {
                        target: url,
                        reason: e.to_string(),
                    };
                    if !failover {
                        return Err(error);
                    }
                    tracing::debug!(%host, error = %error, "admin host unavailable, trying next");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AdminError::InvalidUrl("no admin API hosts configured".to_string())))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AdminError> {
        let response = self.send(path, |http, url| http.get(url)).await?;
        handle_response(response).await
    }
}

async fn read_body(response: Response) -> Result<(StatusCode, String), AdminError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AdminError::InvalidResponse(e.to_string()))?;
    Ok((status, body))
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, AdminError> {
    let (status, body) = read_body(response).await?;
    if status.is_success() {
        serde_json::from_str(&body).map_err(|e| AdminError::InvalidResponse(e.to_string()))
    } else {
        Err(AdminError::from_status(status.as_u16(), &body))
    }
}

fn normalize_host(host: &str, scheme: &str) -> Result<String, AdminError> {
    let host = host.trim();
    let url = if host.contains("://") {
        host.to_string()
    } else {
        format!("{scheme}://{host}")
    };
    reqwest::Url::parse(&url).map_err(|e| AdminError::InvalidUrl(format!("{host}: {e}")))?;
    Ok(url.trim_end_matches('/').to_string())
}

fn read_pem(path: &Path) -> Result<Vec<u8>, AdminError> {
    std::fs::read(path).map_err(|e| AdminError::Tls(format!("reading {}: {e}", path.display())))
}

fn configure_tls(mut builder: reqwest::ClientBuilder, tls: &TlsConfig) -> Result<reqwest::ClientBuilder, AdminError> {
    if let Some(ca) = &tls.ca_file {
        let cert = reqwest::Certificate::from_pem(&read_pem(ca)?).map_err(|e| AdminError::Tls(e.to_string()))?;
        builder = builder.add_root_certificate(cert);
    }
    match (&tls.cert_file, &tls.key_file) {
        (Some(cert), Some(key)) => {
            let mut pem = read_pem(cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(key)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| AdminError::Tls(e.to_string()))?;
            Ok(builder.identity(identity))
        }
        (None, None) => Ok(builder),
        _ => Err(AdminError::Tls(
            "client certificate and key must be given together".to_string(),
        )),
    }
}

#[async_trait]
impl AdminApi for HttpAdminClient {
    async fn schema(&self) -> Result<Vec<PropertyDefinition>, AdminError> {
        let response: SchemaResponse = self.get_json("v1/cluster_config/schema").await?;
        Ok(response.properties)
    }

    async fn current_config(&self) -> Result<ConfigResponse, AdminError> {
        self.get_json("v1/cluster_config").await
    }

    async fn patch_config(&self, request: &PatchRequest, mode: WriteMode) -> Result<PatchOutcome, AdminError> {
        let path = format!("v1/cluster_config{}", mode.query());
        let response = self.send(&path, |http, url| http.put(url).json(request)).await?;
        let (status, body) = read_body(response).await?;

        if status.is_success() {
            let accepted: PatchAccepted =
                serde_json::from_str(&body).map_err(|e| AdminError::InvalidResponse(e.to_string()))?;
            return Ok(PatchOutcome::Accepted {
                config_version: accepted.config_version,
            });
        }
        if status == StatusCode::BAD_REQUEST {
            if let Ok(rejected) = serde_json::from_str::<PatchRejected>(&body) {
                if !rejected.errors.is_empty() {
                    return Ok(PatchOutcome::Rejected { errors: rejected.errors });
                }
            }
        }
        Err(AdminError::from_status(status.as_u16(), &body))
    }

    async fn members(&self) -> Result<Vec<NodeId>, AdminError> {
        let members: Vec<MemberResponse> = self.get_json("v1/brokers").await?;
        Ok(members.into_iter().map(|m| m.node_id).collect())
    }

    async fn node_status(&self, node: NodeId) -> Result<NodeStatus, AdminError> {
        self.get_json(&format!("v1/cluster_config/status/{node}")).await
    }
}
