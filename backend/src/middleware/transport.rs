//! Moves session tokens between requests and responses.
//!
//! A token is looked for in the configured header first, then in the session
//! cookie. Whatever channel carried it in carries its replacement back out;
//! the two are never mixed within one request.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderName, HeaderValue,
};

use crate::{
    config::Config,
    models::session::IssuedSession,
    utils::cookies::{build_clear_cookie, build_session_cookie, extract_cookie_value, CookieOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenChannel {
    Header,
    Cookie,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedToken {
    pub token: String,
    pub channel: TokenChannel,
}

#[derive(Debug, Clone)]
pub struct SessionTransport {
    header_name: HeaderName,
    cookie_name: String,
    cookie_options: CookieOptions,
}

impl SessionTransport {
    pub fn new(
        header_name: &str,
        cookie_name: impl Into<String>,
        cookie_options: CookieOptions,
    ) -> anyhow::Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.to_ascii_lowercase().as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session header name {}: {}", header_name, e))?;
        Ok(Self {
            header_name,
            cookie_name: cookie_name.into(),
            cookie_options,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.session_header_name,
            config.session_cookie_name.clone(),
            config.cookie_options(),
        )
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn extract(&self, headers: &HeaderMap) -> Option<PresentedToken> {
        let from_header = headers
            .get(&self.header_name)
            .and_then(|value| value.to_str().ok())
            .map(strip_bearer)
            .filter(|token| !token.is_empty());
        if let Some(token) = from_header {
            return Some(PresentedToken {
                token: token.to_string(),
                channel: TokenChannel::Header,
            });
        }

        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|raw| extract_cookie_value(raw, &self.cookie_name))
            .map(|token| PresentedToken {
                token,
                channel: TokenChannel::Cookie,
            })
    }

    /// Writes `session` onto `headers` through `channel`. Cookies get an
    /// `Expires` attribute only for persistent sessions.
    pub fn write_back(
        &self,
        headers: &mut HeaderMap,
        channel: TokenChannel,
        session: &IssuedSession,
        persistent: bool,
    ) -> anyhow::Result<()> {
        match channel {
            TokenChannel::Header => {
                headers.insert(self.header_name.clone(), HeaderValue::from_str(&session.token)?);
            }
            TokenChannel::Cookie => {
                let expires = persistent.then_some(session.expires_at);
                let cookie = build_session_cookie(
                    &self.cookie_name,
                    &session.token,
                    expires,
                    self.cookie_options,
                );
                headers.append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
            }
        }
        Ok(())
    }

    /// Whether `headers` already carry a session token on `channel`.
    pub fn has_written(&self, headers: &HeaderMap, channel: TokenChannel) -> bool {
        match channel {
            TokenChannel::Header => headers.contains_key(&self.header_name),
            TokenChannel::Cookie => {
                let prefix = format!("{}=", self.cookie_name);
                headers
                    .get_all(SET_COOKIE)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .any(|cookie| cookie.starts_with(&prefix))
            }
        }
    }

    /// Tells a cookie client to drop its session cookie. Header clients own
    /// their storage, so nothing is written for them.
    pub fn clear(&self, headers: &mut HeaderMap, channel: TokenChannel) -> anyhow::Result<()> {
        if channel == TokenChannel::Cookie {
            let cookie = build_clear_cookie(&self.cookie_name, self.cookie_options);
            headers.append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
        }
        Ok(())
    }
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => value,
    }
}
