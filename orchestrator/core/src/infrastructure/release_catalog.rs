// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! GitHub Release Catalog
//!
//! `ReleaseCatalog` backed by the GitHub REST API
//! (`GET /repos/{owner}/{repo}/releases`). Only the newest entry is
//! requested. A repository without releases yields `None`. Only sources
//! hosted on the web host that matches the API base are served
//! (`api.github.com` serves `github.com`).
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Enrich source listings with release metadata
//! - **Integration:** External HTTP API → `SourceRegistry::describe_sources`

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use crate::domain::source::{ReleaseCatalog, ReleaseInfo, ReleaseLookupError};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

pub struct GitHubReleaseCatalog {
    api_base: String,
    web_host: String,
    token: Option<String>,
    client: Client,
}

impl GitHubReleaseCatalog {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ReleaseLookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReleaseLookupError::Transport(e.to_string()))?;

        let api_base = api_base.into().trim_end_matches('/').to_string();
        let web_host = Url::parse(&api_base)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.trim_start_matches("api.").to_ascii_lowercase()))
            .ok_or_else(|| ReleaseLookupError::Transport(format!("invalid release API base '{}'", api_base)))?;

        Ok(Self {
            api_base,
            web_host,
            token,
            client,
        })
    }
}

#[async_trait]
impl ReleaseCatalog for GitHubReleaseCatalog {
    async fn latest_release(&self, repository: &str) -> Result<Option<ReleaseInfo>, ReleaseLookupError> {
        let url = format!("{}/repos/{}/releases?per_page=1", self.api_base, repository);
        debug!(repository, "Fetching latest release");

        let mut request = self
            .client
            .get(&url)
            .header(USER_AGENT, concat!("deployd/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReleaseLookupError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseLookupError::Status {
                repository: repository.to_string(),
                status: status.as_u16(),
            });
        }

        let releases: Vec<ReleaseInfo> = response
            .json()
            .await
            .map_err(|e| ReleaseLookupError::Decode(e.to_string()))?;

        Ok(releases.into_iter().next())
    }

    fn serves(&self, source_url: &str) -> bool {
        match Url::parse(source_url) {
            Ok(url) => url
                .host_str()
                .is_some_and(|host| host.eq_ignore_ascii_case(&self.web_host)),
            // Bare `owner/repo` carries no host.
            Err(_) => !source_url.contains(':'),
        }
    }
}
