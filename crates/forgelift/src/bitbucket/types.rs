//! Typed response structures for the Bitbucket Server REST API.

use serde::Deserialize;

/// Continuation-paginated envelope.
///
/// Bitbucket Server pages carry their own cursor: `isLastPage` says whether
/// to stop, `nextPageStart` is the `start` offset of the following page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub values: Vec<T>,
    pub is_last_page: bool,
    pub next_page_start: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketRepo {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub links: RepoLinks,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepoLinks {
    #[serde(default)]
    pub clone: Vec<CloneLink>,
}

#[derive(Debug, Deserialize)]
pub struct CloneLink {
    pub href: String,
    pub name: String,
}

impl BitbucketRepo {
    /// HTTP clone URL if the server advertises one, else the first link.
    #[must_use]
    pub fn clone_url(&self) -> Option<&str> {
        self.links
            .clone
            .iter()
            .find(|l| l.name == "http" || l.name == "https")
            .or_else(|| self.links.clone.first())
            .map(|l| l.href.as_str())
    }
}
