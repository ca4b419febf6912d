//! Cookie-bearing HTTP transport for the portal, wrapping reqwest.
//!
//! Page fetches are idempotent and retry on 5xx, transport errors, and 429
//! (honouring `retry-after`). Form submissions are single-shot: a failed write
//! may already have consumed the nonce, so retrying is the caller's decision.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};
use crate::protocol::RequestMethod;

const MAX_RETRIES: u32 = 2;

/// A fetched portal page.
#[derive(Debug, Clone)]
pub struct PortalResponse {
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// HTTP client owned by exactly one session.
pub struct PortalHttp {
    client: reqwest::Client,
    jar: Arc<Jar>,
    timeout: Duration,
    user_agent: String,
}

impl PortalHttp {
    pub fn new(config: &PortalConfig) -> PortalResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = build_client(&jar, config.request_timeout, &config.user_agent)?;
        Ok(Self {
            client,
            jar,
            timeout: config.request_timeout,
            user_agent: config.user_agent.clone(),
        })
    }

    /// GET a page, retrying on 5xx, 429, and transport errors.
    pub async fn fetch_page(&self, url: &Url) -> PortalResult<PortalResponse> {
        let mut retries = 0u32;

        loop {
            match self.client.get(url.clone()).send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < MAX_RETRIES {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::debug!(%url, status, retries, "retrying page fetch");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status == 429 && retries < MAX_RETRIES {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    return into_response(url, r).await;
                }
                Err(e) => {
                    if retries < MAX_RETRIES {
                        retries += 1;
                        tracing::debug!(%url, error = %e, retries, "retrying page fetch");
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Send form fields once, as query parameters (GET) or a url-encoded body (POST).
    pub async fn send_form(
        &self,
        url: &Url,
        fields: &[(String, String)],
        method: RequestMethod,
    ) -> PortalResult<PortalResponse> {
        let builder = match method {
            RequestMethod::Get => self.client.get(url.clone()).query(fields),
            RequestMethod::Post => self.client.post(url.clone()).form(fields),
        };
        let r = builder.send().await?;
        into_response(url, r).await
    }

    /// Value of cookie `name` as it would be sent to `url`.
    pub fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }

    /// Drop every cookie except `name=value`, which is seeded for each of `urls`.
    ///
    /// reqwest's jar cannot remove cookies, so the client is rebuilt around a
    /// fresh jar.
    pub fn retain_only_cookie(&mut self, name: &str, value: &str, urls: &[&Url]) -> PortalResult<()> {
        let jar = Arc::new(Jar::default());
        let cookie = format!("{name}={value}; Path=/");
        for url in urls {
            jar.add_cookie_str(&cookie, url);
        }
        self.client = build_client(&jar, self.timeout, &self.user_agent)?;
        self.jar = jar;
        Ok(())
    }
}

fn build_client(jar: &Arc<Jar>, timeout: Duration, user_agent: &str) -> PortalResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(user_agent)
        .cookie_provider(Arc::clone(jar))
        .build()?;
    Ok(client)
}

async fn into_response(url: &Url, r: reqwest::Response) -> PortalResult<PortalResponse> {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();

    if status >= 400 {
        return Err(PortalError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = r.text().await?;
    Ok(PortalResponse {
        final_url,
        status,
        body,
    })
}
