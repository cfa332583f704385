use crate::collector::MetricCollector;
use crate::context::VuContext;
use crate::error::TransportError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// A transport that answers every request with a closure.
pub(crate) struct FnClient<F> {
    f: F,
}

impl<F> FnClient<F>
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> HttpClient for FnClient<F>
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let result = (self.f)(&request);
        Box::pin(async move { result })
    }
}

pub(crate) fn context<D, S: Default>(client: Arc<dyn HttpClient>, shared: D) -> VuContext<D, S> {
    VuContext::new(
        0,
        "test",
        Arc::new(shared),
        client,
        MetricCollector::new(),
        Some(7),
    )
}
