//! Bitbucket Server: third-party hosted source, basic-auth REST.

mod client;
mod types;

pub use client::BitbucketClient;
pub use types::{BitbucketRepo, PagedResponse};
