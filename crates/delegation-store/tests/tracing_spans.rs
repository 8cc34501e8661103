//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on `DelegationStore` operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use chrono::Duration;
use delegation_store::{
    Clock, DelegationStore, DelegationStoreConfig, MemoryBackend,
    testutil::{credential_payload, quiet_store, request_payload},
};
use tracing::{
    Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: records span names and their recorded fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct RecordedSpan {
    name: String,
    fields: Vec<(String, String)>,
}

#[derive(Default)]
struct FieldVisitor(Vec<(String, String)>);

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_owned(), format!("{value:?}")));
    }
}

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let mut visitor = FieldVisitor::default();
            attrs.record(&mut visitor);
            self.spans
                .lock()
                .expect("lock poisoned")
                .push(RecordedSpan { name: span.name().to_owned(), fields: visitor.0 });
        }
    }
}

fn names(spans: &Arc<Mutex<Vec<RecordedSpan>>>) -> Vec<String> {
    spans.lock().expect("lock poisoned").iter().map(|s| s.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_operations_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, _clock) = quiet_store().await;
    store.put_request("abc".into(), request_payload("r")).await.expect("put");
    store.get_request("abc").await.expect("get");
    store.delete_request("abc").await.expect("delete");

    let recorded = names(&spans);
    for expected in ["put_request", "get_request", "delete_request"] {
        assert!(
            recorded.iter().any(|s| s == expected),
            "expected a '{expected}' span, got: {recorded:?}"
        );
    }
}

#[tokio::test]
async fn credential_operations_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, clock) = quiet_store().await;
    let not_after = clock.now() + Duration::hours(1);
    store.put_credential("xyz".into(), credential_payload("c"), not_after).await.expect("put");
    store.get_credential("xyz").await.expect("get");
    store.renew_credential("xyz".into(), credential_payload("c"), not_after).await.expect("renew");
    store.list_delegations().await.expect("list");
    store.delete_credential("xyz").await.expect("delete");
    store.health_check().await.expect("health");

    let recorded = names(&spans);
    for expected in [
        "put_credential",
        "get_credential",
        "renew_credential",
        "list_delegations",
        "delete_credential",
        "health_check",
    ] {
        assert!(
            recorded.iter().any(|s| s == expected),
            "expected a '{expected}' span, got: {recorded:?}"
        );
    }
}

#[tokio::test]
async fn store_spans_nest_backend_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, _clock) = quiet_store().await;
    store.put_request("abc".into(), request_payload("r")).await.expect("put");

    let recorded = names(&spans);
    let put = recorded.iter().rposition(|s| s == "put_request").expect("put_request span");
    assert!(
        recorded[put..].iter().any(|s| s == "compare_and_set"),
        "expected a backend 'compare_and_set' span after put_request, got: {recorded:?}"
    );
}

#[tokio::test]
async fn spans_record_delegation_id_but_not_key_material() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, _clock) = quiet_store().await;
    store.put_request("abc".into(), request_payload("secret-material")).await.expect("put");

    let recorded = spans.lock().expect("lock poisoned");
    let put = recorded.iter().find(|s| s.name == "put_request").expect("put_request span");
    assert!(
        put.fields.iter().any(|(name, value)| name == "delegation_id" && value.contains("abc")),
        "delegation_id should be recorded, got: {:?}",
        put.fields
    );
    assert!(
        recorded.iter().flat_map(|s| &s.fields).all(|(_, value)| !value.contains("secret-material")),
        "key material must not reach span fields"
    );
}

#[tokio::test]
async fn initialize_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    DelegationStore::initialize(MemoryBackend::new(), DelegationStoreConfig::default())
        .await
        .expect("initialize");

    let recorded = names(&spans);
    for expected in ["initialize_with_clock", "initialize_schema"] {
        assert!(
            recorded.iter().any(|s| s == expected),
            "expected a '{expected}' span, got: {recorded:?}"
        );
    }
}
