use url::Url;

use crate::error::ClientError;

const TOKEN_PARAM: &str = "token";
const DEFAULT_PATH: &str = "/ws";

/// Validated realtime endpoint. The scheme is already mapped to `ws`/`wss`, so
/// attaching a credential cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        Self::from_url(Url::parse(raw)?)
    }

    pub fn from_url(mut url: Url) -> Result<Self, ClientError> {
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::UnsupportedScheme(other.to_owned())),
        };
        if url.set_scheme(scheme).is_err() {
            return Err(ClientError::UnsupportedScheme(url.scheme().to_owned()));
        }
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(DEFAULT_PATH);
        }
        url.set_fragment(None);
        Ok(Self { base: url })
    }

    /// Transport URL carrying `credential` as the `token` query parameter.
    /// Any query pairs already on the base URL are kept.
    pub fn with_token(&self, credential: &str) -> Url {
        let mut url = self.base.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != TOKEN_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &retained {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(TOKEN_PARAM, credential);
        }
        url
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_maps_to_wss_with_default_path() {
        let endpoint = Endpoint::parse("https://dash.example.com").expect("endpoint");
        assert_eq!(
            endpoint.with_token("abc").as_str(),
            "wss://dash.example.com/ws?token=abc"
        );
    }

    #[test]
    fn http_maps_to_ws_and_keeps_explicit_path_and_query() {
        let endpoint =
            Endpoint::parse("http://127.0.0.1:8080/realtime?v=2&token=old").expect("endpoint");
        assert_eq!(
            endpoint.with_token("new").as_str(),
            "ws://127.0.0.1:8080/realtime?v=2&token=new"
        );
    }

    #[test]
    fn credential_is_percent_encoded() {
        let endpoint = Endpoint::parse("ws://localhost/ws").expect("endpoint");
        assert_eq!(
            endpoint.with_token("a b&c").as_str(),
            "ws://localhost/ws?token=a+b%26c"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = Endpoint::parse("ftp://example.com").expect_err("ftp");
        assert!(matches!(err, ClientError::UnsupportedScheme(scheme) if scheme == "ftp"));
    }
}
