//! Telegram Bot API client: locator resolution and remote byte fetch.
//!
//! A `file_id` is an opaque token, not a URL. Every relay request resolves it
//! through `getFile`, which returns a `file_path` valid for a limited time.
//! Paths are therefore resolved per request and never cached (see DESIGN.md).

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::TelegramConfig;
use crate::error::RelayError;

/// Budget for one `getFile` round trip. Distinct from the streaming phase,
/// which has no overall deadline.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport-level resolution failures get exactly one retry.
const RESOLVE_RETRIES: u32 = 1;

/// A resolved fetch location, valid for roughly an hour per platform docs.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Path component under the file origin, e.g. `documents/file_12.pdf`.
    pub file_path: String,
    /// Size as reported by the resolution call, when present.
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilePayload {
    file_size: Option<u64>,
    file_path: Option<String>,
}

/// Bot API client. Cheap to clone via the inner reqwest client; held once in
/// the shared server state.
pub struct TelegramApi {
    client: Client,
    token: SecretString,
    api_base: String,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig) -> Self {
        // No global timeout: the same client streams multi-gigabyte files.
        // Per-call deadlines are set on the resolution requests instead.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token: SecretString::from(config.bot_token.expose_secret().to_string()),
            api_base: config.api_base.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            file_path
        )
    }

    /// Resolve a file id into a fetchable path via `getFile`.
    ///
    /// Transport failures are retried once; an API-level rejection is
    /// terminal since the token itself is bad.
    pub async fn resolve_file(&self, file_id: &str) -> Result<ResolvedFile, RelayError> {
        let url = self.method_url("getFile");
        let mut last_err = String::new();

        for attempt in 0..=RESOLVE_RETRIES {
            let sent = self
                .client
                .get(&url)
                .query(&[("file_id", file_id)])
                .timeout(RESOLVE_TIMEOUT)
                .send()
                .await;

            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    // Strip the URL from the error so the bot token never
                    // reaches the logs.
                    last_err = e.without_url().to_string();
                    if attempt < RESOLVE_RETRIES {
                        tracing::debug!(file_id, attempt, "getFile transport error, retrying");
                        continue;
                    }
                    break;
                }
            };

            let body: ApiResponse<FilePayload> =
                match response.json().await {
                    Ok(b) => b,
                    Err(e) => {
                        last_err = e.without_url().to_string();
                        if attempt < RESOLVE_RETRIES {
                            tracing::debug!(file_id, attempt, "getFile bad payload, retrying");
                            continue;
                        }
                        break;
                    }
                };

            if !body.ok {
                return Err(RelayError::LocatorInvalid {
                    reason: body
                        .description
                        .unwrap_or_else(|| "platform returned ok=false".to_string()),
                });
            }

            let payload = body.result.ok_or_else(|| RelayError::Resolution {
                reason: "getFile returned ok without a result".to_string(),
            })?;
            let file_path = payload.file_path.ok_or_else(|| RelayError::Resolution {
                reason: "getFile result carries no file_path".to_string(),
            })?;

            return Ok(ResolvedFile {
                file_path,
                size: payload.file_size,
            });
        }

        Err(RelayError::Resolution { reason: last_err })
    }

    /// Open a byte stream for a resolved file, optionally range-restricted.
    ///
    /// `range` is a raw `Range` header value (`bytes=0-99`). Error statuses
    /// are not translated here; the forwarder decides framing from them.
    pub async fn open_stream(
        &self,
        file: &ResolvedFile,
        range: Option<&str>,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.file_url(&file.file_path);
        let mut req = self.client.get(&url);
        if let Some(range) = range {
            req = req.header(reqwest::header::RANGE, range);
        }

        req.send().await.map_err(|e| RelayError::RemoteFetch {
            reason: e.without_url().to_string(),
        })
    }

    /// Send a plain-text chat message (used for the `/start` reply).
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        let url = self.method_url("sendMessage");
        let response = self
            .client
            .post(&url)
            .timeout(RESOLVE_TIMEOUT)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| RelayError::RemoteFetch {
                reason: e.without_url().to_string(),
            })?;

        if !response.status().is_success() {
            tracing::warn!(chat_id, status = %response.status(), "sendMessage rejected");
        }
        Ok(())
    }
}
