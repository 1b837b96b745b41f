//! Run tracing.
//!
//! [`Telemetry`] is created once at startup with [`Telemetry::init`], handed to each
//! [`Team`](crate::Team) via [`with_telemetry`](crate::Team::with_telemetry), and flushed with
//! [`Telemetry::shutdown`] at exit. A team opens one `run_team` span per run and one `turn`
//! child span per turn.
//!
//! Spans are ordinary [`tracing`] spans created against a dispatcher owned by the
//! `Telemetry` value, so several recorders can coexist in one process and nothing is
//! installed globally. An OpenTelemetry layer turns them into SDK spans, which an
//! `opentelemetry_sdk` tracer provider exports as they close. Diagnostics keep going
//! through the `log` facade.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use opentelemetry_sdk::Resource;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::field::Empty;
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;

use std::sync::Arc;

const DEFAULT_SERVICE_NAME: &str = "groupchat";
const TRACER_NAME: &str = "groupchat";

/// Telemetry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Log a summary line per span on shutdown.
    pub log_spans: bool,
}

impl TelemetryConfig {
    /// Service name from `OTEL_SERVICE_NAME`, falling back to `groupchat`.
    pub fn from_env() -> Self {
        let service_name = std::env::var("OTEL_SERVICE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        Self {
            service_name,
            log_spans: true,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_spans: false,
        }
    }
}

struct Pipeline {
    provider: SdkTracerProvider,
    exporter: InMemorySpanExporter,
}

/// Tracer provider plus the dispatcher team spans are created against.
pub struct Telemetry {
    config: TelemetryConfig,
    dispatch: Dispatch,
    pipeline: Option<Pipeline>,
    active: AtomicBool,
}

impl Telemetry {
    pub fn init(config: TelemetryConfig) -> Arc<Self> {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(config.service_name.clone())
                    .build(),
            )
            .with_simple_exporter(exporter.clone())
            .build();
        let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME));
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(layer));

        log::info!("telemetry initialised for service '{}'", config.service_name);
        Arc::new(Self {
            config,
            dispatch,
            pipeline: Some(Pipeline { provider, exporter }),
            active: AtomicBool::new(true),
        })
    }

    /// A recorder whose spans go nowhere.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            config: TelemetryConfig::default(),
            dispatch: Dispatch::none(),
            pipeline: None,
            active: AtomicBool::new(false),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Root span of a run. `team.turns`, `team.stop_reason` and the status are recorded later.
    pub fn run_span(&self, team_id: &str, participants: &[String]) -> tracing::Span {
        if !self.is_active() {
            return tracing::Span::none();
        }
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info_span!(
                "run_team",
                team.id = %team_id,
                team.participants = %participants.join(","),
                team.turns = Empty,
                team.stop_reason = Empty,
                otel.status_code = Empty,
            )
        })
    }

    /// Child span for one turn. `messages` and the status are recorded when it completes.
    pub fn turn_span(&self, run: &tracing::Span, turn: usize, agent: &str) -> tracing::Span {
        if !self.is_active() {
            return tracing::Span::none();
        }
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info_span!(
                parent: run,
                "turn",
                turn = turn as u64,
                agent = %agent,
                messages = Empty,
                otel.status_code = Empty,
            )
        })
    }

    /// Spans exported so far.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        match &self.pipeline {
            Some(pipeline) => pipeline.exporter.get_finished_spans().unwrap_or_else(|e| {
                log::warn!("could not read finished spans: {:?}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Flush and shut down the tracer provider. Returns every span exported since `init`.
    ///
    /// Spans still open at shutdown are never exported.
    pub fn shutdown(&self) -> Vec<SpanData> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Vec::new();
        }
        let spans = self.finished_spans();
        if let Some(pipeline) = &self.pipeline {
            if let Err(e) = pipeline.provider.shutdown() {
                log::warn!("tracer provider shutdown failed: {}", e);
            }
        }
        if self.config.log_spans {
            for span in &spans {
                log::info!(
                    target: "groupchat::telemetry",
                    "span {} id={} parent={} duration={:?} attributes={}",
                    span.name,
                    span.span_context.span_id(),
                    span.parent_span_id,
                    span.end_time.duration_since(span.start_time).unwrap_or_default(),
                    span.attributes
                        .iter()
                        .map(|kv| format!("{}={}", kv.key, kv.value))
                        .collect::<Vec<_>>()
                        .join(" ")
                );
            }
        }
        log::info!(
            "telemetry for service '{}' shut down after {} spans",
            self.config.service_name,
            spans.len()
        );
        spans
    }
}

/// Mark a span as failed or succeeded in the exported data.
pub fn record_status(span: &tracing::Span, ok: bool) {
    span.record("otel.status_code", if ok { "ok" } else { "error" });
}

/// Attribute value of an exported span, rendered as text.
pub fn span_attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().into_owned())
}
