//! API key exchange (`GetAPIKey`).

use reqwest::Url;

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::xml::parse_document;

pub const TOKEN_URL: &str = "https://geoservices.meteofrance.fr/services/GetAPIKey";

/// Opaque bearer key, embedded in every product base URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wraps a token obtained elsewhere. Météo-France keys are delimited by `__`.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into().trim().to_string();
        if raw.len() < 4 || !raw.starts_with("__") || !raw.ends_with("__") {
            return Err(Error::Authentication(
                "unexpected token format (expected a key delimited by `__`)".into(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

pub(crate) fn token_request_url(base: &str, credentials: &Credentials) -> Result<String> {
    let url = Url::parse_with_params(
        base,
        &[
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid token url {}: {}", base, e)))?;
    Ok(url.to_string())
}

/// Extracts the key from `<Token xmlns="http://ws.apache.org/ns/synapse">__…__</Token>`.
pub(crate) fn parse_token(body: &str) -> Result<Token> {
    let doc = parse_document(body)
        .map_err(|e| Error::Authentication(format!("unreadable GetAPIKey answer: {}", e)))?;
    if doc.name != "Token" {
        return Err(Error::Authentication(format!(
            "GetAPIKey answered with <{}> instead of <Token>",
            doc.name
        )));
    }
    Token::new(doc.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_synapse_token() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Token xmlns="http://ws.apache.org/ns/synapse">__Abc-123__</Token>"#;
        assert_eq!(parse_token(body).unwrap().as_str(), "__Abc-123__");
    }

    #[test]
    fn rejects_undelimited_token() {
        let body = r#"<Token xmlns="http://ws.apache.org/ns/synapse">nope</Token>"#;
        assert!(matches!(parse_token(body), Err(Error::Authentication(_))));
        assert!(matches!(parse_token("<html/>"), Err(Error::Authentication(_))));
        assert!(matches!(parse_token("not xml <"), Err(Error::Authentication(_))));
    }

    #[test]
    fn credentials_are_url_encoded() {
        let creds = Credentials::new("j doe", "p&w").unwrap();
        let url = token_request_url(TOKEN_URL, &creds).unwrap();
        assert_eq!(
            url,
            "https://geoservices.meteofrance.fr/services/GetAPIKey?username=j+doe&password=p%26w"
        );
        assert!(!format!("{:?}", Token::new("__x__").unwrap()).contains("__x__"));
    }
}
