//! Typed client for the registry HTTP API.
//!
//! All routes are relative to the registry base URL.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `info/` | Registry self-description |
//! | GET    | `datatypes/` | List datatypes (paginated) |
//! | POST   | `datatypes/` | Add datatype |
//! | GET    | `archives/` | List or find archives (paginated) |
//! | POST   | `archives/` | Add archive |
//! | GET    | `resources/` | Search resources (paginated) |
//! | POST   | `resources/` | Register resource |
//! | GET    | `resources/{id}/` | Describe resource |
//! | PATCH  | `resources/{id}/` | Update metadata |
//! | GET    | `resources/{id}/locations/` | Locations (paginated) |
//! | POST   | `bulk/resources/` | Describe many (streamed) |
//! | POST   | `bulk/locations/` | Locations for many (streamed) |
//!
//! `{id}` must be a valid resource identifier. Names that are not never
//! reach the network: lookups by such a name find nothing.
//!
//! Paginated routes follow `Link: <url>; rel="next"` headers until
//! exhausted. Streamed routes return concatenated JSON objects.
//!
//! No request is retried.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nbank_core::identifier::ResourceId;
use nbank_core::location::{LocationRecord, NEUROBANK_SCHEME};
use nbank_core::metadata::Metadata;
use reqwest::header::{ACCEPT, LINK};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::{ConfigError, Credentials, RegistryConfig};
use crate::error::RegistryError;
use crate::types::{
    Archive, BulkRequest, Datatype, MetadataPatch, NewResource, RegistryInfo, Resource,
    ResourceLocations, ResourceQuery,
};

const JSON: &str = "application/json";

/// Client for one registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl RegistryClient {
    /// Create a client from configuration.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url,
            credentials: config.credentials,
            timeout,
        })
    }

    /// Base URL of the registry.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full URL identifying a resource: `{base}resources/{id}/`.
    pub fn resource_url(&self, id: &str) -> Result<Url, RegistryError> {
        self.resource_route(id, "")
    }

    // -- Registry, datatypes, archives ---------------------------------------

    /// Calls `GET info/`.
    pub async fn info(&self) -> Result<RegistryInfo, RegistryError> {
        let url = self.route("info/")?;
        self.get_json("GET info/", url, &[]).await
    }

    /// Calls `GET datatypes/`, following pagination.
    pub async fn datatypes(&self) -> Result<Vec<Datatype>, RegistryError> {
        let url = self.route("datatypes/")?;
        self.get_paginated("GET datatypes/", url, &[]).await
    }

    /// Calls `POST datatypes/`.
    pub async fn add_datatype(&self, name: &str, content_type: &str) -> Result<Datatype, RegistryError> {
        let url = self.route("datatypes/")?;
        let body = Datatype {
            name: name.to_string(),
            content_type: content_type.to_string(),
        };
        self.post_json("POST datatypes/", url, &body).await
    }

    /// Calls `GET archives/` with optional name and scheme filters.
    pub async fn archives(
        &self,
        name: Option<&str>,
        scheme: Option<&str>,
    ) -> Result<Vec<Archive>, RegistryError> {
        let url = self.route("archives/")?;
        let mut params = Vec::new();
        if let Some(n) = name {
            params.push(("name".to_string(), n.to_string()));
        }
        if let Some(s) = scheme {
            params.push(("scheme".to_string(), s.to_string()));
        }
        self.get_paginated("GET archives/", url, &params).await
    }

    /// Find the `neurobank` archive registered at `root`.
    ///
    /// Calls `GET archives/?scheme=neurobank&root={root}` and returns the
    /// first hit.
    pub async fn find_archive_by_path(&self, root: &Path) -> Result<Option<Archive>, RegistryError> {
        let url = self.route("archives/")?;
        let params = [
            ("scheme".to_string(), NEUROBANK_SCHEME.to_string()),
            ("root".to_string(), root.to_string_lossy().into_owned()),
        ];
        let hits: Vec<Archive> = self.get_json("GET archives/", url, &params).await?;
        Ok(hits.into_iter().next())
    }

    /// Calls `POST archives/`.
    pub async fn add_archive(&self, name: &str, scheme: &str, root: &str) -> Result<Archive, RegistryError> {
        let url = self.route("archives/")?;
        let body = Archive {
            name: name.to_string(),
            scheme: scheme.to_string(),
            root: root.to_string(),
        };
        self.post_json("POST archives/", url, &body).await
    }

    // -- Resources ------------------------------------------------------------

    /// Calls `GET resources/?{filters}`, following pagination.
    pub async fn search(&self, query: &ResourceQuery) -> Result<Vec<Resource>, RegistryError> {
        let url = self.route("resources/")?;
        self.get_paginated("GET resources/", url, &query.params()).await
    }

    /// Calls `POST resources/`.
    ///
    /// A 4xx response comes back as [`RegistryError::ApiError`] carrying the
    /// server's validation message verbatim.
    pub async fn register(&self, req: &NewResource) -> Result<Resource, RegistryError> {
        let url = self.route("resources/")?;
        self.post_json("POST resources/", url, req).await
    }

    /// Calls `GET resources/{id}/`. Returns `None` on 404 or when `id` is not
    /// a valid identifier.
    pub async fn describe(&self, id: &str) -> Result<Option<Resource>, RegistryError> {
        let Some(url) = self.lookup_route(id, "")? else {
            return Ok(None);
        };
        let endpoint = format!("GET resources/{id}/");
        let resp = self.send(&endpoint, self.http.get(url).header(ACCEPT, JSON)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(&endpoint, resp).await?;
        decode(&endpoint, resp).await.map(Some)
    }

    /// Calls `POST bulk/resources/`. Names unknown to the registry are
    /// silently absent from the result.
    pub async fn describe_many(&self, names: &[String]) -> Result<Vec<Resource>, RegistryError> {
        let url = self.route("bulk/resources/")?;
        self.post_stream("POST bulk/resources/", url, &BulkRequest { names })
            .await
    }

    /// Calls `GET resources/{id}/locations/`, following pagination. Returns
    /// `None` on 404 or when `id` is not a valid identifier.
    pub async fn locations(&self, id: &str) -> Result<Option<Vec<LocationRecord>>, RegistryError> {
        let Some(url) = self.lookup_route(id, "locations/")? else {
            return Ok(None);
        };
        match self
            .get_paginated(&format!("GET resources/{id}/locations/"), url, &[])
            .await
        {
            Ok(locs) => Ok(Some(locs)),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Calls `POST bulk/locations/`. Names unknown to the registry are
    /// silently absent from the result.
    pub async fn bulk_locations(&self, names: &[String]) -> Result<Vec<ResourceLocations>, RegistryError> {
        let url = self.route("bulk/locations/")?;
        self.post_stream("POST bulk/locations/", url, &BulkRequest { names })
            .await
    }

    /// Calls `PATCH resources/{id}/`. Keys set to null are deleted. Returns
    /// `None` on 404 or when `id` is not a valid identifier.
    pub async fn update_metadata(
        &self,
        id: &str,
        metadata: &Metadata,
    ) -> Result<Option<Resource>, RegistryError> {
        let Some(url) = self.lookup_route(id, "")? else {
            return Ok(None);
        };
        let endpoint = format!("PATCH resources/{id}/");
        let req = self
            .http
            .patch(url)
            .header(ACCEPT, JSON)
            .json(&MetadataPatch { metadata });
        let resp = self.send(&endpoint, req).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(&endpoint, resp).await?;
        decode(&endpoint, resp).await.map(Some)
    }

    // -- Downloads ------------------------------------------------------------

    /// Download `url` to `target`.
    ///
    /// The body is written to `{target}.part` and renamed into place once
    /// complete; on any error the partial file is removed. An existing
    /// `target` is an error unless `force` is set.
    pub async fn download(&self, url: &Url, target: &Path, force: bool) -> Result<PathBuf, RegistryError> {
        if !force && tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Err(RegistryError::TargetExists(target.to_path_buf()));
        }
        let endpoint = format!("GET {url}");
        // Large bodies may take longer than the API timeout.
        let resp = self.dispatch(&endpoint, self.http.get(url.clone())).await?;
        let resp = check(&endpoint, resp).await?;

        let part = part_path(target);
        let result = write_body(resp, &endpoint, &part).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&part, target)
                .await
                .map_err(|e| RegistryError::Io {
                    path: target.to_path_buf(),
                    source: e,
                }),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result.map(|()| target.to_path_buf())
    }

    // -- Plumbing -------------------------------------------------------------

    fn route(&self, route: &str) -> Result<Url, RegistryError> {
        self.base_url
            .join(route)
            .map_err(|e| ConfigError::InvalidUrl(route.to_string(), e.to_string()).into())
    }

    /// `resources/{id}/{tail}`, with `id` checked so it stays one path segment.
    fn resource_route(&self, id: &str, tail: &str) -> Result<Url, RegistryError> {
        let id = ResourceId::new(id)?;
        self.route(&format!("resources/{id}/{tail}"))
    }

    /// Like [`Self::resource_route`], but an invalid `id` is `None`.
    fn lookup_route(&self, id: &str, tail: &str) -> Result<Option<Url>, RegistryError> {
        match self.resource_route(id, tail) {
            Ok(url) => Ok(Some(url)),
            Err(RegistryError::InvalidIdentifier(e)) => {
                tracing::debug!("not looking up {id:?}: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Send an API request with the configured timeout.
    async fn send(&self, endpoint: &str, req: RequestBuilder) -> Result<Response, RegistryError> {
        self.dispatch(endpoint, req.timeout(self.timeout)).await
    }

    /// Attach credentials (only for the registry's own host) and send.
    async fn dispatch(&self, endpoint: &str, req: RequestBuilder) -> Result<Response, RegistryError> {
        let req = req.build().map_err(|e| RegistryError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        let same_host = req.url().host_str() == self.base_url.host_str();
        let mut builder = RequestBuilder::from_parts(self.http.clone(), req);
        if let (true, Some(c)) = (same_host, &self.credentials) {
            builder = builder.basic_auth(&c.username, Some(c.password.as_str()));
        }
        tracing::debug!(endpoint, "registry request");
        builder.send().await.map_err(|e| RegistryError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: Url,
        params: &[(String, String)],
    ) -> Result<T, RegistryError> {
        let req = self.http.get(url).query(params).header(ACCEPT, JSON);
        let resp = check(endpoint, self.send(endpoint, req).await?).await?;
        decode(endpoint, resp).await
    }

    async fn get_paginated<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: Url,
        params: &[(String, String)],
    ) -> Result<Vec<T>, RegistryError> {
        let mut out = Vec::new();
        let mut req = self.http.get(url).query(params).header(ACCEPT, JSON);
        loop {
            let resp = check(endpoint, self.send(endpoint, req).await?).await?;
            let next = resp
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let mut page: Vec<T> = decode(endpoint, resp).await?;
            out.append(&mut page);
            match next {
                Some(next) => {
                    tracing::debug!(endpoint, next = %next, "following pagination");
                    req = self.http.get(next).header(ACCEPT, JSON);
                }
                None => return Ok(out),
            }
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: Url,
        body: &B,
    ) -> Result<T, RegistryError> {
        let req = self.http.post(url).header(ACCEPT, JSON).json(body);
        let resp = check(endpoint, self.send(endpoint, req).await?).await?;
        decode(endpoint, resp).await
    }

    async fn post_stream<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: Url,
        body: &B,
    ) -> Result<Vec<T>, RegistryError> {
        let req = self.http.post(url).header(ACCEPT, JSON).json(body);
        let resp = check(endpoint, self.send(endpoint, req).await?).await?;
        let bytes = resp.bytes().await.map_err(|e| RegistryError::Deserialization {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        parse_stream(&bytes).map_err(|e| RegistryError::Stream {
            endpoint: endpoint.to_string(),
            source: e,
        })
    }
}

/// Turn a non-success response into [`RegistryError::ApiError`].
async fn check(endpoint: &str, resp: Response) -> Result<Response, RegistryError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(RegistryError::ApiError {
        endpoint: endpoint.to_string(),
        status,
        body,
    })
}

async fn decode<T: DeserializeOwned>(endpoint: &str, resp: Response) -> Result<T, RegistryError> {
    resp.json().await.map_err(|e| RegistryError::Deserialization {
        endpoint: endpoint.to_string(),
        source: e,
    })
}

async fn write_body(mut resp: Response, endpoint: &str, part: &Path) -> Result<(), RegistryError> {
    let io_err = |e| RegistryError::Io {
        path: part.to_path_buf(),
        source: e,
    };
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    while let Some(chunk) = resp.chunk().await.map_err(|e| RegistryError::Http {
        endpoint: endpoint.to_string(),
        source: e,
    })? {
        file.write_all(&chunk).await.map_err(io_err)?;
    }
    file.flush().await.map_err(io_err)?;
    Ok(())
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Parse a sequence of concatenated or newline-delimited JSON values.
pub fn parse_stream<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, serde_json::Error> {
    serde_json::Deserializer::from_slice(bytes)
        .into_iter::<T>()
        .collect()
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_link(header: &str) -> Option<Url> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

/// Split a full resource URL (`https://host/prefix/resources/{id}/`) into the
/// registry base URL and the identifier. Returns `None` for anything else,
/// including short identifiers.
pub fn parse_resource_url(raw: &str) -> Option<(Url, String)> {
    let url = Url::parse(raw).ok()?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let (id, rest) = segments.split_last()?;
    let (resources, prefix) = rest.split_last()?;
    if *resources != "resources" {
        return None;
    }
    let mut base = url.clone();
    let path = if prefix.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", prefix.join("/"))
    };
    base.set_path(&path);
    base.set_query(None);
    base.set_fragment(None);
    Some((base, (*id).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_found_among_relations() {
        let header = r#"<https://r.org/api/resources/?page=1>; rel="prev", <https://r.org/api/resources/?page=3>; rel="next""#;
        assert_eq!(
            next_link(header).unwrap().as_str(),
            "https://r.org/api/resources/?page=3"
        );
        assert!(next_link(r#"<https://r.org/x>; rel="prev""#).is_none());
    }

    #[test]
    fn stream_parses_concatenated_and_newline_delimited() {
        let data = br#"{"name":"a"}{"name":"b"}
{"name":"c"}
"#;
        let values: Vec<serde_json::Value> = parse_stream(data).unwrap();
        let names: Vec<_> = values.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(parse_stream::<serde_json::Value>(b"").unwrap().is_empty());
        assert!(parse_stream::<serde_json::Value>(b"{\"name\":").is_err());
    }

    #[test]
    fn resource_url_splits_into_base_and_id() {
        let (base, id) = parse_resource_url("https://meliza.org/neurobank/resources/st11_1/").unwrap();
        assert_eq!(base.as_str(), "https://meliza.org/neurobank/");
        assert_eq!(id, "st11_1");

        let (base, id) = parse_resource_url("http://localhost:8000/resources/abc").unwrap();
        assert_eq!(base.as_str(), "http://localhost:8000/");
        assert_eq!(id, "abc");

        assert!(parse_resource_url("st11_1").is_none());
        assert!(parse_resource_url("https://meliza.org/neurobank/archives/x/").is_none());
    }

    #[test]
    fn resource_url_rejects_names_that_leave_the_route() {
        let client = RegistryClient::new(RegistryConfig::new("https://r.test/api/").unwrap()).unwrap();
        assert_eq!(
            client.resource_url("st11_1").unwrap().as_str(),
            "https://r.test/api/resources/st11_1/"
        );
        for bad in ["../archives/birds", "st11?x", "a#b", "a/b", ""] {
            assert!(matches!(
                client.resource_url(bad),
                Err(RegistryError::InvalidIdentifier(_))
            ));
        }
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(part_path(Path::new("/tmp/st11.wav")), PathBuf::from("/tmp/st11.wav.part"));
    }
}
