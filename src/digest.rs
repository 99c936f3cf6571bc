// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Session digest collaborator.
//!
//! Thin boundary to the server-side digest pipeline: upload a session
//! transcript, get back free-text digest content to persist locally. The
//! digest itself is opaque to this client; no inspection, no retry, no
//! post-processing.

use crate::client::{ClientError, INSTALL_TIMEOUT};

use reqwest::blocking::Client;

/// Upload `transcript` and return the digest content the server produced.
///
/// # Errors
///
/// - Return [`ClientError::Network`] if the server is unreachable or the
///   request times out.
/// - Return [`ClientError::BadResponse`] if the server rejects the upload.
pub fn generate_digest(
    base_url: &str,
    api_key: &str,
    transcript: &str,
) -> Result<String, ClientError> {
    let url = format!("{}/api/client/digest", base_url.trim_end_matches('/'));
    let client = Client::builder()
        .timeout(INSTALL_TIMEOUT)
        .user_agent(concat!("cadenza/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&serde_json::json!({ "transcript": transcript }))
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::BadResponse { status, url });
    }

    Ok(response.text()?)
}
