//! Paged filtered reads.
//!
//! A paged collection holds one page of server-filtered records plus the
//! total match count. Navigation refetches through an injected getter so
//! the collection stays decoupled from the transport; a separate counter
//! closure refreshes the total. Out-of-range navigation is a no-op, never
//! an error.

use crate::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use syncmirror_protocol::Record;
use syncmirror_reactive::{Cell, NotifyMode, Registration, Subscription};

/// Fetches one page: `(page, page_size) -> records`.
pub type PageGetter = Box<dyn Fn(u64, u64) -> EngineResult<Vec<Record>> + Send + Sync>;

/// Refreshes the total match count.
pub type TotalCounter = Box<dyn Fn() -> EngineResult<u64> + Send + Sync>;

/// One observable page of a server-filtered read.
pub struct PagedCollection {
    getter: PageGetter,
    counter: TotalCounter,
    page: RwLock<u64>,
    page_size: RwLock<u64>,
    total: RwLock<u64>,
    records: Cell<Vec<Record>>,
    /// Set while our own refetch runs, so the admissions it causes are
    /// not mistaken for structural changes.
    refetching: AtomicBool,
    /// Keeps the cache-dispatcher registration alive for the view's
    /// lifetime.
    membership: Mutex<Option<Registration<Record>>>,
}

impl PagedCollection {
    /// Creates a collection and fetches its first page.
    pub fn new(
        page_size: u64,
        mode: NotifyMode,
        getter: PageGetter,
        counter: TotalCounter,
    ) -> EngineResult<Self> {
        if page_size == 0 {
            return Err(EngineError::Validation("page size must be positive".into()));
        }
        let collection = Self {
            getter,
            counter,
            page: RwLock::new(0),
            page_size: RwLock::new(page_size),
            total: RwLock::new(0),
            records: Cell::with_mode(Vec::new(), mode),
            refetching: AtomicBool::new(false),
            membership: Mutex::new(None),
        };
        collection.refresh()?;
        Ok(collection)
    }

    /// The current zero-based page index.
    pub fn page(&self) -> u64 {
        *self.page.read()
    }

    /// The page size.
    pub fn page_size(&self) -> u64 {
        *self.page_size.read()
    }

    /// The total number of matching records server-side.
    pub fn total(&self) -> u64 {
        *self.total.read()
    }

    /// Snapshot of the current page.
    pub fn records(&self) -> Vec<Record> {
        self.records.get()
    }

    /// Subscribes to page content changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<Vec<Record>>
    where
        F: Fn(&Vec<Record>) + Send + Sync + 'static,
    {
        self.records.subscribe(callback)
    }

    /// Returns a channel receiving every page notification.
    pub fn watch(&self) -> Receiver<Vec<Record>> {
        self.records.watch()
    }

    /// Waits for the next page notification, up to `timeout`.
    pub fn wait_next(&self, timeout: Duration) -> Option<Vec<Record>> {
        self.records.wait_next(timeout)
    }

    /// Refetches the total and the current page.
    ///
    /// If the total shrank below the current page, the page clamps to the
    /// last one that exists.
    pub fn refresh(&self) -> EngineResult<()> {
        self.guarded(|| {
            let total = (self.counter)()?;
            *self.total.write() = total;

            let page_size = self.page_size();
            let last_page = if total == 0 {
                0
            } else {
                (total - 1) / page_size
            };
            {
                let mut page = self.page.write();
                if *page > last_page {
                    *page = last_page;
                }
            }

            let records = (self.getter)(self.page(), page_size)?;
            self.records.replace(records);
            Ok(())
        })
    }

    /// Moves to an absolute page.
    ///
    /// The total is revalidated first, so navigation never trusts a stale
    /// count. Returns false without fetching the page when it does not
    /// exist.
    pub fn set_page(&self, page: u64) -> EngineResult<bool> {
        self.guarded(|| {
            let total = (self.counter)()?;
            *self.total.write() = total;
            if page != 0 && page * self.page_size() >= total {
                return Ok(false);
            }
            *self.page.write() = page;
            let records = (self.getter)(page, self.page_size())?;
            self.records.replace(records);
            Ok(true)
        })
    }

    /// Moves to the next page; a no-op on the last page.
    pub fn next(&self) -> EngineResult<bool> {
        self.set_page(self.page() + 1)
    }

    /// Moves to the previous page; a no-op on the first page.
    pub fn prev(&self) -> EngineResult<bool> {
        let page = self.page();
        if page == 0 {
            return Ok(false);
        }
        self.set_page(page - 1)
    }

    /// Changes the page size and refetches from the first page.
    pub fn set_page_size(&self, page_size: u64) -> EngineResult<()> {
        if page_size == 0 {
            return Err(EngineError::Validation("page size must be positive".into()));
        }
        *self.page_size.write() = page_size;
        *self.page.write() = 0;
        self.refresh()
    }

    /// Notes that a record entered the backing cache.
    ///
    /// The total bumps optimistically so pagination math stays usable
    /// offline, then a refresh reconciles with the server where possible.
    pub fn note_added(&self) {
        if self.refetching.load(Ordering::SeqCst) {
            // Our own refetch admitting records is not structural news.
            return;
        }
        *self.total.write() += 1;
        self.reconcile();
    }

    /// Notes that a record left the backing cache.
    pub fn note_removed(&self) {
        if self.refetching.load(Ordering::SeqCst) {
            return;
        }
        let mut total = self.total.write();
        *total = total.saturating_sub(1);
        drop(total);
        self.reconcile();
    }

    pub(crate) fn track_membership(&self, registration: Registration<Record>) {
        *self.membership.lock() = Some(registration);
    }

    fn guarded<R>(&self, refetch: impl FnOnce() -> R) -> R {
        self.refetching.store(true, Ordering::SeqCst);
        let result = refetch();
        self.refetching.store(false, Ordering::SeqCst);
        result
    }

    fn reconcile(&self) {
        if let Err(error) = self.refresh() {
            // Keep the optimistic counts; the next refresh corrects them.
            tracing::debug!(%error, "paged reconcile deferred");
        }
    }
}
