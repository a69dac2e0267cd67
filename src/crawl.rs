// src/crawl.rs

//! Crawling helpers for paginated list endpoints.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;

use crate::engine::Scope;

/// Pagination block returned alongside every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    pub max_page: u32,
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
    pub list: Vec<T>,
}

/// Fetch pages `1..=max_page` one work unit at a time and concatenate them.
///
/// Each unit is described as `Fetching <what>, page N`. Stops after the page
/// whose `max_page` is not greater than its own number, so an endpoint
/// reporting `max_page = 0` still costs exactly one request.
pub async fn fetch_all_pages<C, T, F, Fut>(
    scope: &mut Scope<C>,
    what: &str,
    mut fetch_page: F,
) -> anyhow::Result<Vec<T>>
where
    C: Send + Sync + 'static,
    F: FnMut(u32, Arc<C>) -> Fut,
    Fut: Future<Output = anyhow::Result<Page<T>>>,
{
    let mut all = Vec::new();
    let mut page = 1;

    loop {
        let response = scope
            .work_with(format!("Fetching {what}, page {page}"), |w| {
                fetch_page(page, w.context_handle())
            })
            .await?;

        all.extend(response.list);

        if page >= response.page_info.max_page {
            break;
        }
        page += 1;
    }

    Ok(all)
}

/// Append `page` and `row_per_page` query parameters to `base`.
pub fn paged_url(base: &str, page: u32, row_per_page: u32) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}page={page}&row_per_page={row_per_page}")
}
