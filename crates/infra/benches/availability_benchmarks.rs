use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use equiplend_auth::{Caller, Role};
use equiplend_core::{EquipmentId, FixedClock, RequestId, UserId};
use equiplend_events::{EventEnvelope, InMemoryEventBus};
use equiplend_infra::{InMemoryLendingRepository, LendingService, NewBorrowRequest};
use equiplend_inventory::{Equipment, NewEquipment};
use equiplend_lending::{
    BorrowRequest, BorrowWindow, LendingEvent, RequestStatus, SubmitRequest, check_availability,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2032, 1, 1, 0, 0, 0).unwrap()
}

fn equipment(total: u32) -> Equipment {
    Equipment::register(
        EquipmentId::new(),
        NewEquipment {
            name: "Bench camera".to_string(),
            total_quantity: total,
            ..NewEquipment::default()
        },
        base(),
    )
    .unwrap()
}

/// `count` approved one-unit bookings, one per hour, spread over the calendar.
fn bookings(eq: &Equipment, count: usize) -> Vec<BorrowRequest> {
    (0..count)
        .map(|i| {
            let from = base() + Duration::hours(i as i64);
            let event = BorrowRequest::submit(&SubmitRequest {
                request_id: RequestId::new(),
                requester: UserId::new(),
                equipment_id: eq.id_typed(),
                quantity: 1,
                purpose: "bench".to_string(),
                window: BorrowWindow::new(from, from + Duration::hours(3)).unwrap(),
                occurred_at: base(),
            })
            .unwrap();
            let LendingEvent::RequestSubmitted(e) = event else {
                unreachable!()
            };
            let mut snap = BorrowRequest::from_submitted(&e).snapshot();
            snap.status = RequestStatus::Approved;
            BorrowRequest::restore(snap)
        })
        .collect()
}

fn bench_check_availability(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_availability");

    for count in [10usize, 100, 1_000, 10_000] {
        let eq = equipment(5);
        let held = bookings(&eq, count);
        let candidate = BorrowWindow::new(
            base() + Duration::hours(count as i64 / 2),
            base() + Duration::hours(count as i64 / 2 + 2),
        )
        .unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("holding_requests", count), &count, |b, _| {
            b.iter(|| check_availability(&eq, black_box(&candidate), 1, &held, None));
        });
    }

    group.finish();
}

fn bench_create_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_create_request");
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => panic!("failed to build runtime: {e}"),
    };

    group.bench_function("create_on_busy_line", |b| {
        let svc = LendingService::new(
            Arc::new(InMemoryLendingRepository::new()),
            Arc::new(InMemoryEventBus::<EventEnvelope<LendingEvent>>::new()),
            Arc::new(FixedClock::new(base())),
        );
        let admin = Caller::new(UserId::new(), Role::Admin);
        let eq = rt
            .block_on(svc.register_equipment(
                &admin,
                NewEquipment {
                    name: "Busy line".to_string(),
                    total_quantity: 1_000_000,
                    ..NewEquipment::default()
                },
            ))
            .unwrap();
        let student = Caller::new(UserId::new(), Role::Student);
        let window = BorrowWindow::new(base() + Duration::days(1), base() + Duration::days(2)).unwrap();

        b.iter(|| {
            rt.block_on(svc.create_request(
                &student,
                NewBorrowRequest {
                    equipment_id: eq.id_typed(),
                    quantity: black_box(1),
                    window,
                    purpose: "bench".to_string(),
                },
            ))
            .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_check_availability, bench_create_request);
criterion_main!(benches);
