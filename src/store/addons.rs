use crate::config::StoreSettings;
use crate::error::{PreshError, Result};
use crate::store::{StoreApi, StoreLocale};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use std::io::{self, Read};
use std::net::IpAddr;
use std::time::Duration;
use url::Url;
use url::form_urlencoded::Serializer;

const MAX_CATALOG_BYTES: usize = 10 * 1024 * 1024;
const MAX_ARCHIVE_BYTES: usize = 100 * 1024 * 1024;

/// Client for the PrestaShop add-ons API
pub struct AddonsClient {
    client: Client,
    api_url: Url,
    platform_version: Option<String>,
    timeout: Duration,
}

impl AddonsClient {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let api_url = Self::validate_url(&settings.api_url)?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.as_str())
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| PreshError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            platform_version: settings.platform_version.clone(),
            timeout: settings.timeout,
        })
    }

    /// Download an archive from an arbitrary URL (modules not listed in the catalog).
    pub fn download_url(&self, url: &str) -> Result<Vec<u8>> {
        let url = Self::validate_url(url)?;
        tracing::debug!(%url, "downloading module archive");

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| self.transport_error(e))?;

        self.read_body(response, MAX_ARCHIVE_BYTES, url.as_str(), PreshError::Download)
    }

    fn form_body(&self, locale: &StoreLocale, method: &[(&str, &str)]) -> String {
        let mut form = Serializer::new(String::new());
        if let Some(version) = &self.platform_version {
            form.append_pair("version", version);
        }
        form.append_pair("iso_lang", &locale.language);
        form.append_pair("iso_code", &locale.country);
        for (key, value) in method {
            form.append_pair(key, value);
        }
        form.finish()
    }

    fn post(&self, locale: &StoreLocale, method: &[(&str, &str)]) -> Result<Response> {
        let body = self.form_body(locale, method);
        tracing::debug!(url = %self.api_url, %body, "add-ons API request");

        self.client
            .post(self.api_url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .map_err(|e| self.transport_error(e))
    }

    fn read_body(
        &self,
        response: Response,
        limit: usize,
        what: &str,
        error: fn(String) -> PreshError,
    ) -> Result<Vec<u8>> {
        Self::check_response(response.status(), response.content_length(), limit, what)
            .map_err(error)?;
        self.read_capped(response, limit, what).map_err(error)
    }

    /// Reject a response before reading its body: non-2xx status, or a
    /// declared length above `limit`.
    fn check_response(
        status: StatusCode,
        content_length: Option<u64>,
        limit: usize,
        what: &str,
    ) -> std::result::Result<(), String> {
        if !status.is_success() {
            return Err(format!("HTTP {status} from {what}"));
        }
        match content_length {
            Some(len) if len > limit as u64 => Err(Self::too_large(what, limit)),
            _ => Ok(()),
        }
    }

    /// Read at most `limit` bytes; a longer body is an error.
    fn read_capped<R: Read>(
        &self,
        reader: R,
        limit: usize,
        what: &str,
    ) -> std::result::Result<Vec<u8>, String> {
        let mut body = Vec::new();
        reader
            .take(limit as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::TimedOut {
                    format!("timed out after {}s", self.timeout.as_secs())
                } else {
                    format!("reading {what}: {e}")
                }
            })?;

        if body.len() > limit {
            return Err(Self::too_large(what, limit));
        }
        Ok(body)
    }

    fn too_large(what: &str, limit: usize) -> String {
        format!("Response from {} exceeded {}MB limit", what, limit / (1024 * 1024))
    }

    fn transport_error(&self, error: reqwest::Error) -> PreshError {
        if error.is_timeout() {
            PreshError::Download(format!("timed out after {}s", self.timeout.as_secs()))
        } else {
            PreshError::Download(error.to_string())
        }
    }

    fn validate_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url)
            .map_err(|_| PreshError::Configuration(format!("Invalid URL: {url}")))?;

        match parsed.scheme() {
            "https" | "http" => {}
            scheme => {
                return Err(PreshError::Configuration(format!(
                    "Unsupported URL scheme: {scheme}"
                )));
            }
        }

        if let Some(host) = parsed.host_str() {
            if Self::is_private_host(host) {
                return Err(PreshError::Configuration(format!(
                    "Host '{host}' is not allowed"
                )));
            }
        }

        Ok(parsed)
    }

    fn is_private_host(host: &str) -> bool {
        if host.eq_ignore_ascii_case("localhost") {
            return true;
        }

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            match ip {
                IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
                IpAddr::V6(v6) => v6.is_loopback() || v6.is_unique_local(),
            }
        } else {
            false
        }
    }
}

impl StoreApi for AddonsClient {
    fn fetch_catalog(&self, locale: &StoreLocale) -> Result<String> {
        let response = self
            .post(locale, &[("method", "listing"), ("action", "native")])
            .map_err(|e| PreshError::CatalogUnavailable(e.to_string()))?;

        let what = self.api_url.to_string();
        let body = self.read_body(
            response,
            MAX_CATALOG_BYTES,
            &what,
            PreshError::CatalogUnavailable,
        )?;
        String::from_utf8(body)
            .map_err(|e| PreshError::CatalogUnavailable(format!("catalog is not UTF-8: {e}")))
    }

    fn download_module(&self, remote_id: &str, locale: &StoreLocale) -> Result<Vec<u8>> {
        let response = self.post(locale, &[("method", "module"), ("id_module", remote_id)])?;
        self.read_body(
            response,
            MAX_ARCHIVE_BYTES,
            &format!("module {remote_id}"),
            PreshError::Download,
        )
    }
}
