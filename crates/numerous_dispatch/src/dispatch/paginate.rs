//! Iteration over server-paginated collections.

use std::{
    collections::{HashSet, VecDeque},
    ops::ControlFlow,
};

use futures::{Stream, stream};
use serde_json::Value;
use tower::Service;

use crate::Error as CrateError;

use super::{
    context::{RequestContext, Target},
    error::DispatchError,
    executor::RequestExecutor,
    http::{TransportRequest, TransportResponse},
    internal_event::{Chunk, DuplicateFiltered, InternalEvent, PageFetched},
};

/// Remembers item keys of the current and the previous page.
///
/// The server may repeat items across a page boundary when the collection changes
/// while it is being read. Only adjacent pages are compared.
#[derive(Clone, Debug, Default)]
pub struct DuplicateFilterWindow {
    previous: HashSet<String>,
    current: HashSet<String>,
}

impl DuplicateFilterWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new page: the current page becomes the previous one.
    pub fn slide(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }

    /// Returns false when `key` was seen on the previous page. Admitted keys are
    /// remembered for the next page.
    pub fn admit(&mut self, key: &str) -> bool {
        if self.previous.contains(key) {
            return false;
        }
        self.current.insert(key.to_string());
        true
    }
}

/// The key as its JSON text, so `1` and `"1"` stay distinct.
fn item_key(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Cursor over a paginated collection.
///
/// The paginator does not own the executor: every call borrows it for the duration of
/// one page fetch, so a shared executor is only held while a request is in flight.
#[derive(Debug)]
pub struct Paginator {
    ctx: RequestContext,
    next: Option<Target>,
    buffer: VecDeque<Value>,
    window: DuplicateFilterWindow,
    pages: u64,
}

impl Paginator {
    pub fn new(ctx: RequestContext) -> Self {
        Self {
            next: Some(ctx.target.clone()),
            ctx,
            buffer: VecDeque::new(),
            window: DuplicateFilterWindow::new(),
            pages: 0,
        }
    }

    /// Returns the next item, fetching pages as needed. `Ok(None)` once the last page
    /// has been consumed.
    pub async fn next_item<S>(
        &mut self,
        executor: &mut RequestExecutor<S>,
    ) -> Result<Option<Value>, DispatchError>
    where
        S: Service<TransportRequest, Response = TransportResponse>,
        S::Error: Into<CrateError>,
    {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            let Some(target) = self.next.take() else {
                return Ok(None);
            };
            self.fetch(executor, target).await?;
        }
    }

    async fn fetch<S>(
        &mut self,
        executor: &mut RequestExecutor<S>,
        target: Target,
    ) -> Result<(), DispatchError>
    where
        S: Service<TransportRequest, Response = TransportResponse>,
        S::Error: Into<CrateError>,
    {
        let url = target.resolve(executor.settings().base_url());
        let page = executor
            .execute(&self.ctx, None, Some(&url))
            .await?
            .into_value();

        let chunk = if self.pages == 0 {
            executor.stats_mut().first_chunks += 1;
            Chunk::First
        } else {
            executor.stats_mut().additional_chunks += 1;
            Chunk::Additional
        };
        self.pages += 1;

        self.next = self
            .ctx
            .next_field
            .as_deref()
            .and_then(|field| page.get(field))
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty())
            .map(Target::parse);

        let items = match self.ctx.list_field.as_deref() {
            Some(field) => match page {
                Value::Object(mut map) => map.remove(field),
                _ => None,
            },
            None => Some(page),
        };
        let items = match items {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        PageFetched {
            chunk,
            items: items.len(),
        }
        .emit();

        let dedup_key = self
            .ctx
            .dup_filter
            .as_deref()
            .filter(|_| executor.settings().duplicate_filter());
        let Some(field) = dedup_key else {
            self.buffer.extend(items);
            return Ok(());
        };

        self.window.slide();
        for item in items {
            if let Some(key) = item_key(&item, field) {
                if !self.window.admit(&key) {
                    executor.stats_mut().duplicates_filtered += 1;
                    DuplicateFiltered { key: &key }.emit();
                    continue;
                }
            }
            self.buffer.push_back(item);
        }
        Ok(())
    }

    /// Turns the cursor into a stream that borrows `executor` until dropped.
    pub fn into_stream<S>(
        self,
        executor: &mut RequestExecutor<S>,
    ) -> impl Stream<Item = Result<Value, DispatchError>> + '_
    where
        S: Service<TransportRequest, Response = TransportResponse>,
        S::Error: Into<CrateError>,
    {
        stream::try_unfold((self, executor), |(mut pager, executor)| async move {
            let item = pager.next_item(executor).await?;
            Ok::<_, DispatchError>(item.map(|item| (item, (pager, executor))))
        })
    }
}

/// Hands every item of the collection described by `ctx` to `consumer`, in server
/// order, until the collection ends or the consumer breaks.
///
/// Items already delivered stay delivered when a later page fails.
pub async fn for_each<S, F>(
    executor: &mut RequestExecutor<S>,
    ctx: RequestContext,
    mut consumer: F,
) -> Result<(), DispatchError>
where
    S: Service<TransportRequest, Response = TransportResponse>,
    S::Error: Into<CrateError>,
    F: FnMut(Value) -> ControlFlow<()>,
{
    let mut pager = Paginator::new(ctx);
    while let Some(item) = pager.next_item(executor).await? {
        if consumer(item).is_break() {
            break;
        }
    }
    Ok(())
}
