//! Pagination Extension
//!
//! DAOs over large collections additionally implement [`PaginatedDao`] and
//! expose it through [`Dao::as_paginated`].

use super::{Dao, Operation, RequestContext};
use crate::error::{DaoError, Result};
use crate::resource::Resource;
use async_trait::async_trait;

/// One page of a listing
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<Box<dyn Resource>>,
    /// Token for the following page; empty when this is the last one
    pub next_token: String,
}

impl Page {
    pub fn has_more(&self) -> bool {
        !self.next_token.is_empty()
    }
}

#[async_trait]
pub trait PaginatedDao: Dao {
    /// Fetch up to `page_size` items starting at `page_token` (`""` for the
    /// first page). Passing the returned token back resumes exactly after the
    /// last item of this page over an unchanged upstream collection.
    async fn list_page(&self, ctx: &RequestContext, page_size: usize, page_token: &str) -> Result<Page>;
}

/// Fetch every page (auto-paginate)
///
/// Falls back to a plain [`Dao::list`] when the DAO is not paginated.
pub async fn list_all_pages(
    dao: &dyn Dao,
    ctx: &RequestContext,
    page_size: usize,
) -> Result<Vec<Box<dyn Resource>>> {
    if !dao.supports(Operation::List) {
        return Err(DaoError::Unsupported {
            operation: Operation::List,
        });
    }
    let Some(paginated) = dao.as_paginated() else {
        return super::list_resources(dao, ctx).await;
    };
    if page_size == 0 {
        return Err(DaoError::invalid_argument("page size must be positive"));
    }

    let mut all_items = Vec::new();
    let mut page_token = String::new();
    let mut pages = 0usize;

    loop {
        let page = ctx.run(paginated.list_page(ctx, page_size, &page_token)).await?;
        pages += 1;
        all_items.extend(page.items);

        if page.next_token.is_empty() {
            break;
        }
        if page.next_token == page_token {
            return Err(DaoError::upstream(
                format!("list {}", dao.resource_type()),
                "-",
                anyhow::anyhow!("page token did not advance: {}", page_token),
            ));
        }
        page_token = page.next_token;
    }

    tracing::debug!(
        "list_all_pages: {} {} fetched {} items in {} pages",
        dao.service_name(),
        dao.resource_type(),
        all_items.len(),
        pages
    );
    Ok(all_items)
}
