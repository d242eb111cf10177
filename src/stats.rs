//! Summary statistics over a scope's full record list.

use std::collections::BTreeMap;

use crate::models::{AttendanceRecord, AttendanceStats, AttendanceStatus, ServerAggregate};

/// Count records by status and compute the presence rate.
///
/// Always called with the full scope list, never the filtered view, so the
/// summary panel cannot disagree with the roster.
pub fn aggregate(records: &[AttendanceRecord]) -> AttendanceStats {
    let mut by_status: BTreeMap<AttendanceStatus, usize> =
        AttendanceStatus::ALL.iter().map(|status| (*status, 0)).collect();

    for record in records {
        *by_status.entry(record.status).or_insert(0) += 1;
    }

    let total = records.len();
    let attending = by_status[&AttendanceStatus::Present] + by_status[&AttendanceStatus::Online];

    AttendanceStats {
        total,
        by_status,
        present_rate: present_rate(attending, total),
    }
}

/// Rounded percentage of `attending` over `total`; 0 for an empty scope.
pub fn present_rate(attending: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let attending = attending.min(total);
    // Integer round-half-up of attending * 100 / total.
    ((attending * 200 + total) / (total * 2)) as u8
}

/// Whether a backend-reported aggregate agrees with the computed one.
///
/// Only used for diagnostics; the computed stats are always what is shown.
pub fn agrees_with_server(stats: &AttendanceStats, server: &ServerAggregate) -> bool {
    let attending = stats.count(AttendanceStatus::Present) + stats.count(AttendanceStatus::Online);
    let absent = stats.total - attending;
    server.present + server.late == attending && server.absent == absent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectRole;

    fn records(counts: &[(AttendanceStatus, usize)]) -> Vec<AttendanceRecord> {
        let mut out = Vec::new();
        for (status, count) in counts {
            for _ in 0..*count {
                let n = out.len();
                out.push(AttendanceRecord {
                    id: format!("r{n}"),
                    subject_id: format!("s{n}"),
                    subject_name: format!("Learner {n}"),
                    group_label: "5C".to_string(),
                    subject_role: SubjectRole::Learner,
                    status: *status,
                    mode: None,
                    recorded_time: None,
                });
            }
        }
        out
    }

    #[test]
    fn test_scope_of_twenty_five() {
        let list = records(&[
            (AttendanceStatus::Present, 20),
            (AttendanceStatus::Online, 3),
            (AttendanceStatus::ExcusedSick, 1),
            (AttendanceStatus::ExcusedPermission, 1),
        ]);
        let stats = aggregate(&list);

        assert_eq!(stats.total, 25);
        assert_eq!(stats.count(AttendanceStatus::Present), 20);
        assert_eq!(stats.count(AttendanceStatus::Online), 3);
        assert_eq!(stats.count(AttendanceStatus::ExcusedSick), 1);
        assert_eq!(stats.count(AttendanceStatus::ExcusedPermission), 1);
        assert_eq!(stats.by_status.get(&AttendanceStatus::UnexcusedAbsence), Some(&0));
        assert_eq!(stats.present_rate, 92);
    }

    #[test]
    fn test_empty_scope_has_zero_rate_and_all_keys() {
        let stats = aggregate(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.present_rate, 0);
        assert_eq!(stats.by_status.len(), AttendanceStatus::ALL.len());
        assert!(stats.by_status.values().all(|count| *count == 0));
    }

    #[test]
    fn test_counts_sum_to_total() {
        let shapes: [&[(AttendanceStatus, usize)]; 4] = [
            &[(AttendanceStatus::Present, 1)],
            &[(AttendanceStatus::UnexcusedAbsence, 7), (AttendanceStatus::Online, 2)],
            &[
                (AttendanceStatus::ExcusedSick, 3),
                (AttendanceStatus::ExcusedPermission, 4),
                (AttendanceStatus::Present, 11),
            ],
            &[(AttendanceStatus::Online, 40)],
        ];
        for shape in shapes {
            let stats = aggregate(&records(shape));
            assert_eq!(stats.by_status.values().sum::<usize>(), stats.total);
            assert!(stats.present_rate <= 100);
        }
    }

    #[test]
    fn test_present_rate_rounding() {
        assert_eq!(present_rate(1, 3), 33);
        assert_eq!(present_rate(2, 3), 67);
        assert_eq!(present_rate(1, 8), 13); // 12.5 rounds up
        assert_eq!(present_rate(5, 5), 100);
        assert_eq!(present_rate(0, 9), 0);
        assert_eq!(present_rate(0, 0), 0);
    }

    #[test]
    fn test_server_aggregate_comparison() {
        let stats = aggregate(&records(&[
            (AttendanceStatus::Present, 4),
            (AttendanceStatus::ExcusedSick, 1),
        ]));
        let matching = ServerAggregate {
            present: 3,
            late: 1,
            absent: 1,
        };
        let stale = ServerAggregate {
            present: 5,
            late: 0,
            absent: 0,
        };
        assert!(agrees_with_server(&stats, &matching));
        assert!(!agrees_with_server(&stats, &stale));
    }
}
