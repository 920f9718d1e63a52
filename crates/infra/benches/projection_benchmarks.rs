use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use std::sync::Arc;
use tokio::runtime::Runtime;

use streamfold_core::{AggregateId, EventId};
use streamfold_entity::{
    ENTITY_STREAM_TYPE, Entity, EntityCreated, EntityDescriptionUpdated, EntityEvent, EntityId, EntityUpdated,
};
use streamfold_events::{Event, EventEnvelope, Projection};
use streamfold_infra::command_dispatcher::CommandDispatcher;
use streamfold_infra::event_store::InMemoryEventStore;
use streamfold_infra::projections::{AuditLog, AuditLogProjection, EntityStatus, EntityStatusProjection};
use streamfold_infra::read_model::InMemoryDocumentStore;

fn stream(id: EntityId, len: usize) -> Vec<EntityEvent> {
    let mut events = vec![EntityEvent::Created(EntityCreated {
        id,
        name: "bench".to_string(),
        description: "d0".to_string(),
        user_id: "u-1".to_string(),
        occurred_at: Utc::now(),
    })];
    for n in 1..len {
        let event = if n % 2 == 0 {
            EntityEvent::Updated(EntityUpdated {
                id,
                name: format!("bench-{n}"),
                description: format!("d{n}"),
                user_id: "u-1".to_string(),
                occurred_at: Utc::now(),
            })
        } else {
            EntityEvent::DescriptionUpdated(EntityDescriptionUpdated {
                id,
                description: format!("d{n}"),
                user_id: "u-1".to_string(),
                occurred_at: Utc::now(),
            })
        };
        events.push(event);
    }
    events
}

/// `streams` interleaved streams of `per_stream` events each, in global order.
fn interleaved_batch(streams: usize, per_stream: usize) -> Vec<EventEnvelope<EntityEvent>> {
    let all: Vec<Vec<EntityEvent>> = (0..streams)
        .map(|_| stream(EntityId::new(AggregateId::new()), per_stream))
        .collect();

    let mut batch = Vec::with_capacity(streams * per_stream);
    let mut sequence = 0;
    for version in 0..per_stream {
        for events in &all {
            sequence += 1;
            let event = events[version].clone();
            batch.push(EventEnvelope::new(
                EventId::new(),
                event.aggregate_id(),
                ENTITY_STREAM_TYPE,
                version as u64 + 1,
                sequence,
                event.event_type(),
                event.occurred_at(),
                event,
            ));
        }
    }
    batch
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_fold");

    for len in [10usize, 100, 1_000] {
        let events = stream(EntityId::new(AggregateId::new()), len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &events, |b, events| {
            b.iter(|| black_box(Entity::fold(events).unwrap()));
        });
    }

    group.finish();
}

fn bench_status_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("status_projection_batch");

    for streams in [10usize, 100] {
        let mut batch = interleaved_batch(streams, 10);
        // Worst case for the re-sort: fully reversed delivery.
        batch.reverse();
        group.throughput(Throughput::Elements(batch.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(streams), &batch, |b, batch| {
            b.iter(|| {
                let store: Arc<InMemoryDocumentStore<EntityId, EntityStatus>> = Arc::new(InMemoryDocumentStore::new());
                let projection = EntityStatusProjection::new(store);
                rt.block_on(projection.apply_batch(batch)).unwrap();
                black_box(projection)
            });
        });
    }

    group.finish();
}

fn bench_audit_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("audit_projection_batch");

    for streams in [10usize, 100] {
        let batch = interleaved_batch(streams, 10);
        group.throughput(Throughput::Elements(batch.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(streams), &batch, |b, batch| {
            b.iter(|| {
                let store: Arc<InMemoryDocumentStore<EntityId, AuditLog>> = Arc::new(InMemoryDocumentStore::new());
                let projection = AuditLogProjection::new(store);
                rt.block_on(projection.apply_batch(batch)).unwrap();
                black_box(projection)
            });
        });
    }

    group.finish();
}

fn bench_dispatch_with_history(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch_with_history");
    group.sample_size(50);

    for history in [10usize, 100] {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = EntityId::new(AggregateId::new());
        rt.block_on(async {
            for event in stream(id, history) {
                dispatcher.dispatch(event).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(history), &id, |b, id| {
            b.iter(|| {
                let event = EntityEvent::DescriptionUpdated(EntityDescriptionUpdated {
                    id: *id,
                    description: "bench".to_string(),
                    user_id: "u-1".to_string(),
                    occurred_at: Utc::now(),
                });
                black_box(rt.block_on(dispatcher.dispatch(event)).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fold,
    bench_status_batch,
    bench_audit_batch,
    bench_dispatch_with_history
);
criterion_main!(benches);
