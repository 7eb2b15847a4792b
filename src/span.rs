use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::field;

use crate::metrics::{Counter, CounterVec, Histogram, HistogramVec, Metrics};

/// Where a new [`CallSpan`] hangs off: the parent tracing span, plus (inside a server span) the
/// accumulator that outbound client spans report their elapsed time into.
///
/// Cheap to clone, so it can be moved into spawned tasks.
#[derive(Debug, Clone)]
pub struct SpanContext {
    span: tracing::Span,
    client_time: Option<Arc<ClientTime>>,
}

impl SpanContext {
    /// Continues whatever tracing span is current on this task.
    pub fn current() -> Self {
        Self::from(tracing::Span::current())
    }

    pub fn tracing_span(&self) -> &tracing::Span {
        &self.span
    }

    /// Same context, with new spans hanging off `span` instead.
    pub fn with_span(&self, span: tracing::Span) -> Self {
        Self { span, client_time: self.client_time.clone() }
    }
}

impl From<tracing::Span> for SpanContext {
    fn from(span: tracing::Span) -> Self {
        Self { span, client_time: None }
    }
}

/// Seconds spent in outbound calls on behalf of one inbound request, stored as nanoseconds.
#[derive(Debug, Default)]
struct ClientTime(AtomicU64);

impl ClientTime {
    fn add(&self, seconds: f64) {
        self.0.fetch_add((seconds * 1e9) as u64, Ordering::Relaxed);
    }

    fn seconds(&self) -> f64 {
        self.0.load(Ordering::Relaxed) as f64 / 1e9
    }
}

/// Times one unit of work and reports it both as a tracing span and as metrics.
///
/// A span is started with an arbitrary label tuple (e.g. `["memcached", "get_profile"]`) and
/// the counter/histogram families it reports into. When it finishes, the tracing span is closed,
/// the counter for the label tuple is incremented once and the elapsed seconds are observed once
/// in the histogram for the same tuple.
///
/// Finishing happens exactly once: explicitly through [`CallSpan::finish`], or on drop for any
/// path that never reaches it (early return, `?`, panic, or a cancelled future).
#[derive(Debug)]
pub struct CallSpan {
    start: Instant,
    span: tracing::Span,
    labels: Vec<String>,
    tags: Vec<(String, String)>,
    counter: Arc<Counter>,
    histogram: Arc<Histogram>,
    report_to: Option<Arc<ClientTime>>,
    exclusive: Option<(Arc<ClientTime>, Arc<Histogram>)>,
    finished: bool,
}

impl CallSpan {
    pub fn start<S: AsRef<str>>(
        ctx: &SpanContext,
        labels: &[S],
        counter: &CounterVec,
        histogram: &HistogramVec,
    ) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.as_ref().to_owned()).collect();
        let values: Vec<&str> = labels.iter().map(String::as_str).collect();
        let span = tracing::info_span!(
            parent: &ctx.span,
            "call",
            otel.name = %labels.join("_"),
            tags = field::Empty
        );
        Self {
            start: Instant::now(),
            counter: counter.with_label_values(&values),
            histogram: histogram.with_label_values(&values),
            span,
            labels,
            tags: Vec::new(),
            report_to: None,
            exclusive: None,
            finished: false,
        }
    }

    /// Starts a span for an inbound request. Client spans started from its
    /// [`context`](CallSpan::context) count towards its exclusive latency.
    pub fn server(ctx: &SpanContext, metrics: &Metrics, method: &str) -> Self {
        let mut span = Self::start(ctx, &[method], &metrics.server_requests, &metrics.server_latency);
        span.exclusive = Some((
            Arc::new(ClientTime::default()),
            metrics.server_exclusive_latency.with_label_values(&[method]),
        ));
        span
    }

    /// Starts a span for an outbound call to `service`.
    pub fn client(ctx: &SpanContext, metrics: &Metrics, service: &str, method: &str) -> Self {
        let mut span =
            Self::start(ctx, &[service, method], &metrics.client_requests, &metrics.client_latency);
        span.report_to = ctx.client_time.clone();
        span
    }

    /// Context for spans nested under this one.
    pub fn context(&self) -> SpanContext {
        SpanContext {
            span: self.span.clone(),
            client_time: self.exclusive.as_ref().map(|(acc, _)| acc.clone()),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.push((key.into(), value.into()));
        let rendered =
            self.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",");
        self.span.record("tags", field::display(rendered));
    }

    /// Closes the span, records its metrics and returns the elapsed time in seconds.
    pub fn finish(mut self) -> f64 {
        self.complete()
    }

    fn complete(&mut self) -> f64 {
        self.finished = true;
        drop(std::mem::replace(&mut self.span, tracing::Span::none()));

        let elapsed = self.start.elapsed().as_secs_f64();
        self.counter.inc();
        self.histogram.observe(elapsed);
        if let Some(acc) = &self.report_to {
            acc.add(elapsed);
        }
        if let Some((acc, exclusive)) = &self.exclusive {
            exclusive.observe((elapsed - acc.seconds()).max(0.0));
        }
        elapsed
    }
}

impl Drop for CallSpan {
    fn drop(&mut self) {
        if !self.finished {
            self.complete();
        }
    }
}
