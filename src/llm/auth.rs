//! OAuth client-credentials：启动时换取一次 access token，作为 OpenAI 兼容端点的 API Key

use std::time::Duration;

use serde::Deserialize;

use crate::config::OAuthSection;
use crate::core::AgentError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// 向 token_url 发送 client_credentials 请求，返回 access_token
pub async fn fetch_oauth_token(oauth: &OAuthSection, timeout_secs: u64) -> Result<String, AgentError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AgentError::AuthError(format!("Build client: {}", e)))?;

    tracing::info!(token_url = %oauth.token_url, "requesting oauth token");
    let resp = client
        .post(&oauth.token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
        ])
        .send()
        .await
        .map_err(|e| AgentError::AuthError(format!("Token request failed: {}", e)))?;

    if !resp.status().is_success() {
        return Err(AgentError::AuthError(format!("Token endpoint returned HTTP {}", resp.status())));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| AgentError::AuthError(format!("Read token body: {}", e)))?;
    parse_token_response(&body)
}

fn parse_token_response(body: &str) -> Result<String, AgentError> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::AuthError(format!("Token response missing access_token: {}", e)))?;
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let token = parse_token_response(r#"{"access_token":"abc","expires_in":3600}"#).unwrap();
        assert_eq!(token, "abc");
        assert!(matches!(
            parse_token_response(r#"{"error":"invalid_client"}"#),
            Err(AgentError::AuthError(_))
        ));
    }
}
