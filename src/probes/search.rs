//! Keyword search sub-probe.
//!
//! Issues `GET <base>?<param>=<keyword>` and inspects the list field of the
//! JSON object that comes back.

use serde_json::Value;
use tracing::warn;

use super::{HttpTransport, ProbeError, RetryPolicy, SearchOutcome};
use crate::config::ProbeSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTest {
    pub keyword: String,
    /// Query parameter carrying the keyword (`wd` for the usual CMS APIs).
    pub param: String,
    /// Field of the response object holding the result list.
    pub list_field: String,
}

impl SearchTest {
    /// `None` when the search test is switched off or has no keyword.
    pub fn from_settings(settings: &ProbeSettings) -> Option<Self> {
        if !settings.search_enabled || settings.search_keyword.is_empty() {
            return None;
        }
        Some(Self {
            keyword: settings.search_keyword.clone(),
            param: settings.search_param.clone(),
            list_field: settings.list_field.clone(),
        })
    }

    /// Append the escaped keyword to `base_url`, keeping any existing query.
    pub fn url_for(&self, base_url: &str) -> Result<String, ProbeError> {
        let mut url = reqwest::Url::parse(base_url)
            .map_err(|e| ProbeError::Transport(format!("invalid url {base_url}: {e}")))?;
        url.query_pairs_mut().append_pair(&self.param, &self.keyword);
        Ok(url.into())
    }

    /// Run the search check with retries. Never fails: exhausted retries map
    /// to [`SearchOutcome::Error`].
    pub async fn run(
        &self,
        transport: &dyn HttpTransport,
        base_url: &str,
        policy: &RetryPolicy,
    ) -> SearchOutcome {
        let url = match self.url_for(base_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(endpoint = %base_url, error = %e, "cannot build search url");
                return SearchOutcome::Error;
            }
        };

        let target = url.as_str();
        policy
            .run(target, |_| async move {
                let resp = transport.get(target, policy.timeout).await?;
                if resp.status != 200 {
                    return Err(ProbeError::UnexpectedStatus(resp.status));
                }
                classify(&resp.body, &self.list_field, &self.keyword)
            })
            .await
            .unwrap_or(SearchOutcome::Error)
    }
}

/// Classify a 200 response body.
///
/// Anything that is not a JSON object is [`ProbeError::MalformedBody`]. The
/// list counts as empty when it is missing, null, an empty array or string,
/// or any other non-list value.
pub fn classify(body: &[u8], list_field: &str, keyword: &str) -> Result<SearchOutcome, ProbeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProbeError::MalformedBody(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(ProbeError::MalformedBody("response is not a JSON object".into()));
    };

    let list = match map.get(list_field) {
        Some(list @ Value::Array(items)) if !items.is_empty() => list,
        Some(list @ Value::String(s)) if !s.is_empty() => list,
        _ => return Ok(SearchOutcome::Empty),
    };

    if list.to_string().contains(keyword) {
        Ok(SearchOutcome::Match)
    } else {
        Ok(SearchOutcome::NoMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::{ok_json, status, FakeTransport};
    use std::time::Duration;

    fn test() -> SearchTest {
        SearchTest {
            keyword: "斗罗大陆".to_string(),
            param: "wd".to_string(),
            list_field: "list".to_string(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_url_escapes_keyword() {
        let url = test().url_for("https://cms.test/api.php/provide/vod").unwrap();
        assert_eq!(
            url,
            "https://cms.test/api.php/provide/vod?wd=%E6%96%97%E7%BD%97%E5%A4%A7%E9%99%86"
        );
    }

    #[test]
    fn test_url_keeps_existing_query() {
        let url = test().url_for("https://cms.test/api?ac=list").unwrap();
        assert!(url.starts_with("https://cms.test/api?ac=list&wd="));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(test().url_for("not a url").is_err());
    }

    #[test]
    fn test_classify_match_and_no_match() {
        let hit = r#"{"code":1,"list":[{"vod_name":"斗罗大陆 第二季"}]}"#.as_bytes();
        let miss = r#"{"code":1,"list":[{"vod_name":"完美世界"}]}"#.as_bytes();
        assert_eq!(classify(hit, "list", "斗罗大陆"), Ok(SearchOutcome::Match));
        assert_eq!(classify(miss, "list", "斗罗大陆"), Ok(SearchOutcome::NoMatch));
    }

    #[test]
    fn test_classify_empty_variants() {
        for body in [
            r#"{}"#,
            r#"{"list":null}"#,
            r#"{"list":[]}"#,
            r#"{"list":""}"#,
            r#"{"list":{"a":1}}"#,
            r#"{"list":7}"#,
        ] {
            assert_eq!(
                classify(body.as_bytes(), "list", "x"),
                Ok(SearchOutcome::Empty),
                "body {body}"
            );
        }
    }

    #[test]
    fn test_classify_rejects_non_objects() {
        assert!(matches!(
            classify(b"[1,2]", "list", "x"),
            Err(ProbeError::MalformedBody(_))
        ));
        assert!(matches!(
            classify(b"<html>", "list", "x"),
            Err(ProbeError::MalformedBody(_))
        ));
    }

    #[tokio::test]
    async fn test_run_maps_exhausted_retries_to_error() {
        let base = "http://cms.test/api";
        let url = test().url_for(base).unwrap();
        let fake = FakeTransport::default().always(&url, status(500));

        let outcome = test().run(&fake, base, &policy()).await;

        assert_eq!(outcome, SearchOutcome::Error);
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn test_run_retries_malformed_body() {
        let base = "http://cms.test/api";
        let url = test().url_for(base).unwrap();
        let fake = FakeTransport::default()
            .then(&url, ok_json("gateway hiccup"))
            .always(&url, ok_json(r#"{"list":[]}"#));

        let outcome = test().run(&fake, base, &policy()).await;

        assert_eq!(outcome, SearchOutcome::Empty);
        assert_eq!(fake.calls(), 2);
    }
}
