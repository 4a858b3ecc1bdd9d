use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{PageRequest, PageSource};

type Responder = dyn Fn(&PageRequest) -> EtlResult<String> + Send + Sync;

struct Inner {
    responder: Box<Responder>,
    latency: Duration,
    requests: Mutex<Vec<PageRequest>>,
    failures: Mutex<HashMap<u32, (u32, ErrorKind)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pages_in_flight: Mutex<Vec<u32>>,
    overlaps: Mutex<Vec<(u32, Vec<u32>)>>,
}

/// In-process [`PageSource`] answering requests with a closure.
///
/// Every request is recorded. Pages can be scripted to fail a number of times before the
/// closure is consulted, and an artificial latency makes concurrent requests overlap so the
/// peak concurrency can be observed. Clones share their state.
#[derive(Clone)]
pub struct ScriptedSource {
    inner: Arc<Inner>,
}

impl ScriptedSource {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&PageRequest) -> EtlResult<String> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                responder: Box::new(responder),
                latency: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
                failures: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                pages_in_flight: Mutex::new(Vec::new()),
                overlaps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Delays every response by `latency`.
    ///
    /// Must be called before the source is cloned.
    pub fn with_latency(self, latency: Duration) -> Self {
        let inner = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("with_latency must be called before cloning"));

        Self {
            inner: Arc::new(Inner { latency, ..inner }),
        }
    }

    /// Makes the next `times` requests for `page` fail with an error of `kind`.
    pub fn fail_page(&self, page: u32, times: u32, kind: ErrorKind) {
        self.inner
            .failures
            .lock()
            .unwrap()
            .insert(page, (times, kind));
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    /// Number of requests received for `page`.
    pub fn requests_for_page(&self, page: u32) -> usize {
        self.inner
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.page == page)
            .count()
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// For every request in arrival order, its page and the pages still in flight when it
    /// started.
    pub fn overlaps(&self) -> Vec<(u32, Vec<u32>)> {
        self.inner.overlaps.lock().unwrap().clone()
    }

    fn scripted_failure(&self, page: u32) -> Option<ErrorKind> {
        let mut failures = self.inner.failures.lock().unwrap();
        let (remaining, kind) = failures.get_mut(&page)?;
        if *remaining == 0 {
            return None;
        }

        *remaining -= 1;
        Some(*kind)
    }
}

impl fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("latency", &self.inner.latency)
            .field("requests", &self.inner.requests.lock().unwrap().len())
            .finish()
    }
}

struct InFlightGuard<'a> {
    inner: &'a Inner,
    page: u32,
}

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a Inner, page: u32) -> Self {
        let current = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let mut pages = inner.pages_in_flight.lock().unwrap();
        inner.overlaps.lock().unwrap().push((page, pages.clone()));
        pages.push(page);

        Self { inner, page }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut pages = self.inner.pages_in_flight.lock().unwrap();
        if let Some(index) = pages.iter().position(|page| *page == self.page) {
            pages.swap_remove(index);
        }
        drop(pages);

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PageSource for ScriptedSource {
    async fn fetch_page(&self, request: &PageRequest) -> EtlResult<String> {
        self.inner.requests.lock().unwrap().push(request.clone());
        let _guard = InFlightGuard::enter(&self.inner, request.page);

        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }

        if let Some(kind) = self.scripted_failure(request.page) {
            return Err(etl_error!(
                kind,
                "Scripted page failure",
                format!("page {}", request.page)
            ));
        }

        (self.inner.responder)(request)
    }
}
