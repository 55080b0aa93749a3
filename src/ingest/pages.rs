/// Paginated fetch: walks one provider query page by page.
///
/// Every HTTP request, retries included, is preceded by exactly one
/// [`RateLimiter::acquire`]. A 5xx response is retried at the same offset
/// until `max_attempts` calls have been made; the attempt counter resets
/// after each successful page.
///
/// The walk ends when the next offset passes `metadata.resultset.count`,
/// when the provider answers `{}`, or at the first error. After yielding an
/// error the iterator is exhausted.

use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use super::noaa::{parse_page, Page, PageBody, ProviderQuery};
use super::{FetchError, Provider};
use crate::ratelimit::{Clock, RateLimiter, SystemClock};

pub struct Pages<'a, T, P: Provider, C: Clock = SystemClock> {
    provider: &'a mut P,
    limiter: &'a mut RateLimiter<C>,
    query: &'a ProviderQuery,
    max_attempts: u32,
    offset: u32,
    calls: u32,
    finished: bool,
    _records: PhantomData<T>,
}

impl<'a, T, P, C> Pages<'a, T, P, C>
where
    T: DeserializeOwned,
    P: Provider,
    C: Clock,
{
    pub fn new(
        provider: &'a mut P,
        limiter: &'a mut RateLimiter<C>,
        query: &'a ProviderQuery,
        max_attempts: u32,
    ) -> Self {
        Self::starting_at(provider, limiter, query, max_attempts, 1)
    }

    /// Resumes a walk at a 1-based record offset.
    pub fn starting_at(
        provider: &'a mut P,
        limiter: &'a mut RateLimiter<C>,
        query: &'a ProviderQuery,
        max_attempts: u32,
        offset: u32,
    ) -> Self {
        Self {
            provider,
            limiter,
            query,
            max_attempts: max_attempts.max(1),
            offset: offset.max(1),
            calls: 0,
            finished: false,
            _records: PhantomData,
        }
    }

    /// Offset of the next page to be requested.
    pub fn next_offset(&self) -> u32 {
        self.offset
    }

    /// HTTP requests issued so far, retries included.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    fn fetch_page(&mut self) -> Option<Result<Page<T>, FetchError>> {
        let url = self.query.url(self.offset);
        let mut attempts = 1;

        loop {
            if let Err(source) = self.limiter.acquire() {
                return Some(Err(FetchError::QuotaExhausted { url, source }));
            }
            self.calls += 1;

            let response = match self.provider.get(&url) {
                Ok(response) => response,
                Err(source) => return Some(Err(FetchError::Transport { url, source })),
            };

            match response.status {
                200..=299 => {
                    return match parse_page::<T>(&response.body) {
                        Ok(PageBody::Records { total, records }) => {
                            let page = Page { offset: self.offset, total, records };
                            self.offset = self.offset.saturating_add(self.query.page_size());
                            if u64::from(self.offset) > total {
                                self.finished = true;
                            }
                            Some(Ok(page))
                        }
                        Ok(PageBody::NoResults) => {
                            log::warn!(
                                station = self.query.station_id().unwrap_or(""),
                                url = url.as_str();
                                "No results"
                            );
                            None
                        }
                        Err(source) => Some(Err(FetchError::MalformedBody { url, source })),
                    };
                }
                status @ 500..=599 => {
                    if attempts < self.max_attempts {
                        log::debug!("HTTP {} on attempt {} for {}, retrying", status, attempts, url);
                        attempts += 1;
                        continue;
                    }
                    return Some(Err(FetchError::RetriesExhausted { url, status, attempts }));
                }
                status => return Some(Err(FetchError::UnexpectedStatus { url, status })),
            }
        }
    }
}

impl<'a, T, P, C> Iterator for Pages<'a, T, P, C>
where
    T: DeserializeOwned,
    P: Provider,
    C: Clock,
{
    type Item = Result<Page<T>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = self.fetch_page();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

impl<'a, T, P, C> std::iter::FusedIterator for Pages<'a, T, P, C>
where
    T: DeserializeOwned,
    P: Provider,
    C: Clock,
{
}
