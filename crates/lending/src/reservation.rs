//! Reservation engine: capacity arithmetic over overlapping borrow windows.
//!
//! Only `approved` and `issued` requests hold capacity. The check is a
//! pessimistic reading of stored state; callers serialise writers per item
//! so that a passing check cannot be invalidated before it is committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use equiplend_core::{EquipmentId, RequestId};
use equiplend_inventory::Equipment;

use crate::request::BorrowRequest;
use crate::window::BorrowWindow;

/// Sum of quantities held by requests on `equipment_id` whose window overlaps `window`.
pub fn reserved_quantity<'a, I>(
    equipment_id: EquipmentId,
    window: &BorrowWindow,
    requests: I,
    exclude: Option<RequestId>,
) -> u64
where
    I: IntoIterator<Item = &'a BorrowRequest>,
{
    requests
        .into_iter()
        .filter(|r| r.equipment_id() == equipment_id)
        .filter(|r| r.holds_capacity())
        .filter(|r| Some(r.id_typed()) != exclude)
        .filter(|r| r.window().overlaps(window))
        .map(|r| u64::from(r.quantity()))
        .sum()
}

/// `total_quantity` minus everything reserved over `window`.
///
/// Negative when stored state is already over-committed.
pub fn compute_available_quantity<'a, I>(equipment: &Equipment, window: &BorrowWindow, requests: I) -> i64
where
    I: IntoIterator<Item = &'a BorrowRequest>,
{
    let reserved = reserved_quantity(equipment.id_typed(), window, requests, None);
    i64::from(equipment.total_quantity()) - reserved as i64
}

/// Whether `quantity` more units fit over `window`.
pub fn check_availability<'a, I>(
    equipment: &Equipment,
    window: &BorrowWindow,
    quantity: u32,
    requests: I,
    exclude: Option<RequestId>,
) -> bool
where
    I: IntoIterator<Item = &'a BorrowRequest>,
{
    let reserved = reserved_quantity(equipment.id_typed(), window, requests, exclude);
    i64::from(equipment.total_quantity()) - reserved as i64 >= i64::from(quantity)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Read-only answer to "how many can I get over this period?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub equipment_id: EquipmentId,
    pub total_quantity: u32,
    pub available_quantity: i64,
    pub period: AvailabilityPeriod,
}

pub fn availability_report<'a, I>(equipment: &Equipment, window: &BorrowWindow, requests: I) -> AvailabilityReport
where
    I: IntoIterator<Item = &'a BorrowRequest>,
{
    AvailabilityReport {
        equipment_id: equipment.id_typed(),
        total_quantity: equipment.total_quantity(),
        available_quantity: compute_available_quantity(equipment, window, requests),
        period: AvailabilityPeriod {
            start: window.from(),
            end: window.until(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RequestStatus;
    use crate::request::{LendingEvent, RequestSnapshot, SubmitRequest};
    use chrono::{Duration, TimeZone};
    use equiplend_core::UserId;
    use equiplend_inventory::NewEquipment;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        base() + Duration::days(n)
    }

    fn window(a: i64, b: i64) -> BorrowWindow {
        BorrowWindow::new(day(a), day(b)).unwrap()
    }

    fn camera(total: u32) -> Equipment {
        Equipment::register(
            EquipmentId::new(),
            NewEquipment {
                name: "Camera".to_string(),
                total_quantity: total,
                ..NewEquipment::default()
            },
            base(),
        )
        .unwrap()
    }

    fn request(
        equipment: &Equipment,
        quantity: u32,
        w: BorrowWindow,
        status: RequestStatus,
    ) -> BorrowRequest {
        let cmd = SubmitRequest {
            request_id: RequestId::new(),
            requester: UserId::new(),
            equipment_id: equipment.id_typed(),
            quantity,
            purpose: "Shoot".to_string(),
            window: w,
            occurred_at: base() - Duration::days(30),
        };
        let LendingEvent::RequestSubmitted(e) = BorrowRequest::submit(&cmd).unwrap() else {
            panic!("Expected RequestSubmitted");
        };
        let mut snap: RequestSnapshot = BorrowRequest::from_submitted(&e).snapshot();
        snap.status = status;
        BorrowRequest::restore(snap)
    }

    #[test]
    fn overlapping_approved_request_blocks_candidate() {
        let eq = camera(5);
        let held = vec![request(&eq, 3, window(1, 3), RequestStatus::Approved)];

        assert!(!check_availability(&eq, &window(2, 4), 3, &held, None));
        assert!(check_availability(&eq, &window(2, 4), 2, &held, None));
        assert_eq!(compute_available_quantity(&eq, &window(2, 4), &held), 2);
    }

    #[test]
    fn touching_windows_do_not_compete() {
        let eq = camera(1);
        let held = vec![request(&eq, 1, window(1, 3), RequestStatus::Issued)];

        assert!(check_availability(&eq, &window(3, 5), 1, &held, None));
        assert!(!check_availability(&eq, &window(2, 5), 1, &held, None));
    }

    #[test]
    fn only_approved_and_issued_hold_capacity() {
        let eq = camera(2);
        for status in RequestStatus::ALL {
            let held = vec![request(&eq, 2, window(1, 3), status)];
            let free = check_availability(&eq, &window(1, 3), 1, &held, None);
            assert_eq!(free, !status.holds_capacity(), "status {status}");
        }
    }

    #[test]
    fn excluded_request_does_not_count_against_itself() {
        let eq = camera(3);
        let own = request(&eq, 3, window(1, 3), RequestStatus::Approved);
        let held = vec![own.clone()];

        assert!(!check_availability(&eq, &own.window(), 3, &held, None));
        assert!(check_availability(&eq, &own.window(), 3, &held, Some(own.id_typed())));
    }

    #[test]
    fn requests_on_other_equipment_are_ignored() {
        let eq = camera(1);
        let other = camera(1);
        let held = vec![request(&other, 1, window(1, 3), RequestStatus::Issued)];

        assert!(check_availability(&eq, &window(1, 3), 1, &held, None));
    }

    #[test]
    fn over_committed_state_reports_negative() {
        let eq = camera(2);
        let held = vec![
            request(&eq, 2, window(1, 3), RequestStatus::Approved),
            request(&eq, 2, window(1, 3), RequestStatus::Issued),
        ];

        let report = availability_report(&eq, &window(1, 2), &held);
        assert_eq!(report.available_quantity, -2);
        assert_eq!(report.total_quantity, 2);
        assert_eq!(report.period.start, day(1));
        assert_eq!(report.period.end, day(2));
        assert!(!check_availability(&eq, &window(1, 2), 0, &held, None));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn candidate() -> impl Strategy<Value = (i64, i64, u32)> {
            (0i64..20, 1i64..6, 1u32..4).prop_map(|(start, len, qty)| (start, start + len, qty))
        }

        proptest! {
            /// Admitting only candidates that pass the check keeps every instant within capacity.
            #[test]
            fn accepted_requests_never_exceed_capacity(
                total in 1u32..6,
                candidates in prop::collection::vec(candidate(), 1..25),
            ) {
                let eq = camera(total);
                let mut accepted: Vec<BorrowRequest> = Vec::new();

                for (a, b, qty) in candidates {
                    let w = window(a, b);
                    if check_availability(&eq, &w, qty, &accepted, None) {
                        accepted.push(request(&eq, qty, w, RequestStatus::Approved));
                    }
                }

                for start in 0i64..26 {
                    let instant = day(start);
                    let in_use: u64 = accepted
                        .iter()
                        .filter(|r| r.window().from() <= instant && instant < r.window().until())
                        .map(|r| u64::from(r.quantity()))
                        .sum();
                    prop_assert!(in_use <= u64::from(total));
                }
            }
        }
    }
}
