//! Link-header pagination as a lazy stream.
//!
//! GitHub-flavored APIs paginate list endpoints through the `Link` response
//! header. [`paged`] follows the `rel="next"` relation until it is absent,
//! yielding items one at a time; a page is only fetched when the previous
//! page's items have been consumed, so the sequence is single-pass and makes
//! exactly one request per page.

use std::collections::VecDeque;

use futures::Stream;
use serde::de::DeserializeOwned;

use crate::http::HttpMethod;
use crate::platform::{ApiError, ApiResult};

use super::client::GitHubClient;

/// Extract the `rel="next"` URL from a `Link` header.
///
/// Link headers look like:
/// `<https://api.example.com/repos?page=2>; rel="next", <...?page=3>; rel="last"`
#[must_use]
pub fn next_link(link_header: &str) -> Option<String> {
    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if rel == Some("next") {
            return url.map(str::to_string);
        }
    }

    None
}

struct PageState<T> {
    client: GitHubClient,
    next: Option<String>,
    buffered: VecDeque<T>,
}

/// Stream all items of a Link-paginated endpoint, starting at `first_url`.
pub fn paged<T>(client: GitHubClient, first_url: String) -> impl Stream<Item = ApiResult<T>> + Send
where
    T: DeserializeOwned + Send + 'static,
{
    let state = PageState {
        client,
        next: Some(first_url),
        buffered: VecDeque::new(),
    };

    futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.buffered.pop_front() {
                return Ok(Some((item, state)));
            }

            let Some(url) = state.next.take() else {
                return Ok(None);
            };

            let resp = state.client.send(HttpMethod::Get, &url, None).await?;
            if !resp.is_success() {
                return Err(ApiError::http(
                    resp.status,
                    String::from_utf8_lossy(&resp.body),
                ));
            }

            state.next = resp.header("link").and_then(next_link);
            let items: Vec<T> = serde_json::from_slice(&resp.body)
                .map_err(|e| ApiError::decode(format!("page body: {e}")))?;
            state.buffered = items.into();
        }
    })
}
