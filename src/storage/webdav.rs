//! Nextcloud folder over WebDAV.
//!
//! Uses PROPFIND (depth 1) for listing and MKCOL, PUT, MOVE and DELETE for
//! mutations. Every path segment we send is percent-encoded; hrefs we receive
//! are decoded before a filename is derived from them.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Method, StatusCode};
use tracing::debug;

use super::{RemoteStore, StoreError};
use crate::model::remote_file::RemoteFile;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:getlastmodified/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

pub struct WebDavStore {
    /// Folder URL without trailing slash.
    base_url: String,
    /// One URL per level of the configured folder path, outermost first.
    dir_urls: Vec<String>,
    auth_header: String,
    client: reqwest::Client,
}

impl WebDavStore {
    /// `server_url` is the Nextcloud root including scheme; `dir` is the
    /// folder below the user's files root and may be nested (`Notes/Tasks`).
    pub fn new(server_url: &str, user: &str, password: &str, dir: &str) -> Self {
        let mut url = format!(
            "{}/remote.php/dav/files/{}",
            server_url.trim_end_matches('/'),
            urlencoding::encode(user)
        );
        let mut dir_urls = Vec::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            url = format!("{url}/{}", urlencoding::encode(segment));
            dir_urls.push(url.clone());
        }

        let creds = format!("{user}:{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: url,
            dir_urls,
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
        }
    }

    fn file_url(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(filename))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", &self.auth_header)
    }
}

fn dav_method(name: &str) -> Result<Method, StoreError> {
    Method::from_bytes(name.as_bytes()).map_err(|e| StoreError::Parse(e.to_string()))
}

async fn unexpected(op: &'static str, target: &str, resp: reqwest::Response) -> StoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    StoreError::UnexpectedStatus {
        op,
        target: target.to_string(),
        status,
        body,
    }
}

#[derive(Debug, Default, PartialEq)]
struct DavEntry {
    href: String,
    last_modified: Option<String>,
    is_collection: bool,
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    LastModified,
}

/// Pull href, last-modified and the collection marker out of a multistatus
/// body. Namespace prefixes vary by server, so elements match on local name.
fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>, StoreError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(DavEntry::default()),
                b"href" => field = Some(Field::Href),
                b"getlastmodified" => field = Some(Field::LastModified),
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(field), Some(entry)) = (field, current.as_mut()) {
                    let text = e.unescape().map_err(|e| StoreError::Parse(e.to_string()))?;
                    match field {
                        Field::Href => entry.href.push_str(&text),
                        Field::LastModified => entry.last_modified = Some(text.into_owned()),
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                b"href" | b"getlastmodified" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(StoreError::Parse(e.to_string())),
            _ => {}
        }
    }

    Ok(entries)
}

/// Last path segment of an href, percent-decoded.
fn filename_from_href(href: &str) -> String {
    let raw = href.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// `getlastmodified` is an RFC 1123 date, e.g. `Mon, 04 Mar 2024 10:00:00 GMT`.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl RemoteStore for WebDavStore {
    fn name(&self) -> &str {
        "WebDAV"
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        let resp = self
            .request(dav_method("PROPFIND")?, &self.base_url)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await
            .with_context(|| format!("PROPFIND {} failed", self.base_url))?;

        let status = resp.status();
        if status != StatusCode::MULTI_STATUS {
            let body = resp.text().await.unwrap_or_default();
            bail!("PROPFIND {} returned {status}: {body}", self.base_url);
        }

        let body = resp.text().await.context("Failed to read PROPFIND response")?;
        debug!(body_length = body.len(), "Received folder listing");

        let files = parse_multistatus(&body)
            .context("Failed to parse PROPFIND response")?
            .into_iter()
            .filter(|entry| !entry.is_collection)
            .map(|entry| {
                let filename = filename_from_href(&entry.href);
                let mtime = entry.last_modified.as_deref().and_then(parse_http_date);
                RemoteFile::new(entry.href, filename, mtime)
            })
            .collect();

        Ok(files)
    }

    async fn mkdir(&self) -> Result<(), StoreError> {
        for url in &self.dir_urls {
            let resp = self.request(dav_method("MKCOL")?, url).send().await?;
            match resp.status() {
                StatusCode::CREATED => debug!(url = %url, "Folder created"),
                StatusCode::METHOD_NOT_ALLOWED => debug!(url = %url, "Folder already exists"),
                _ => return Err(unexpected("MKCOL", url, resp).await),
            }
        }
        Ok(())
    }

    async fn upload(&self, content: &str, filename: &str) -> Result<(), StoreError> {
        let url = self.file_url(filename);
        let resp = self
            .request(Method::PUT, &url)
            .header("Content-Type", "text/markdown; charset=utf-8")
            .body(content.to_owned())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(unexpected("PUT", &url, resp).await);
        }
        debug!(url = %url, "Uploaded");
        Ok(())
    }

    async fn rename(&self, old_filename: &str, new_filename: &str) -> Result<(), StoreError> {
        let url = self.file_url(old_filename);
        let destination = self.file_url(new_filename);
        let resp = self
            .request(dav_method("MOVE")?, &url)
            .header("Destination", &destination)
            .header("Overwrite", "T")
            .send()
            .await?;

        match resp.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!(from = old_filename, to = new_filename, "Renamed");
                Ok(())
            }
            _ => Err(unexpected("MOVE", &url, resp).await),
        }
    }

    async fn delete(&self, filename: &str) -> Result<(), StoreError> {
        let url = self.file_url(filename);
        let resp = self.request(Method::DELETE, &url).send().await?;

        match resp.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                debug!(url = %url, "Deleted");
                Ok(())
            }
            _ => Err(unexpected("DELETE", &url, resp).await),
        }
    }
}
