use tracing::debug;

use crate::domain::cache::{MutationOrigin, TableCache};
use crate::domain::entities::dataset::{Page, PageQuery};
use crate::error::ServiceError;

/// Gate for "load more": one fetch at a time, and none past the last page.
#[derive(Debug)]
pub struct PageLoader {
    page_size: usize,
    in_flight: Option<PageQuery>,
}

impl PageLoader {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            in_flight: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Next page to request, or `None` when a fetch is already running, the
    /// table is not paged or the last page said there is nothing more.
    pub fn begin_fetch(&mut self, cache: &TableCache) -> Option<PageQuery> {
        if self.in_flight.is_some() {
            debug!("load more suppressed: fetch in flight");
            return None;
        }
        let paged = cache.paged()?;
        if !paged.has_more() {
            debug!("load more suppressed: no more pages");
            return None;
        }

        let query = PageQuery {
            page: paged.page_count(),
            page_size: self.page_size,
        };
        self.in_flight = Some(query);
        Some(query)
    }

    /// Appends a fetched page. A failed fetch leaves the cache as it was.
    pub fn finish_fetch(
        &mut self,
        cache: &mut TableCache,
        query: PageQuery,
        result: Result<Page, ServiceError>,
    ) -> Result<usize, ServiceError> {
        if self.in_flight == Some(query) {
            self.in_flight = None;
        }
        let page = result?;
        Ok(cache.append_page(MutationOrigin::PageLoad, page))
    }
}
