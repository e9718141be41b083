//! Desired-versus-actual comparison.
//!
//! Records are grouped per server by (zone, name, type). Only groups the
//! [`OwnershipPolicy`] marks as owned are ever touched: an unowned record
//! blocking a desired one is reported, an unowned record with no desired
//! counterpart is left alone.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::OwnershipPolicy;
use crate::inventory::ObjectRef;
use crate::sync::record::{DnsRecordState, RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        })
    }
}

/// What an operation exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Candidate(ObjectRef),
    StaleRecord,
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribution::Candidate(object) => write!(f, "from {object}"),
            Attribution::StaleRecord => f.write_str("stale record"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub action: Action,
    /// Desired record for create/update, the stale record for delete.
    pub record: DnsRecordState,
    pub attribution: Attribution,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {} ({})",
            self.action, self.record, self.record.server, self.attribution
        )
    }
}

pub type OperationList = Vec<Operation>;

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub operations: OperationList,
    /// Desired records held back because an unowned record has the key.
    pub blocked: Vec<DnsRecordState>,
    /// Unowned records outside the desired set, left untouched.
    pub unmanaged: usize,
    pub unchanged: usize,
}

type GroupKey = (String, RecordKey);

fn group_key(record: &DnsRecordState) -> GroupKey {
    (record.server.to_ascii_lowercase(), record.key())
}

pub fn diff(
    desired: &[DnsRecordState],
    actual: &[DnsRecordState],
    ownership: &OwnershipPolicy,
) -> DiffResult {
    let mut current: BTreeMap<GroupKey, Vec<&DnsRecordState>> = BTreeMap::new();
    for record in actual {
        current.entry(group_key(record)).or_default().push(record);
    }

    let mut wanted: BTreeMap<GroupKey, &DnsRecordState> = BTreeMap::new();
    for record in desired {
        wanted.entry(group_key(record)).or_insert(record);
    }

    let mut result = DiffResult::default();

    for (key, record) in &wanted {
        let attribution = record
            .origin
            .map(Attribution::Candidate)
            .unwrap_or(Attribution::StaleRecord);
        match current.get(key) {
            None => result.operations.push(Operation {
                action: Action::Create,
                record: (*record).clone(),
                attribution,
            }),
            Some(existing) if !existing.iter().any(|r| ownership.is_owned(r)) => {
                result.blocked.push((*record).clone());
            }
            Some(existing) => {
                if existing.len() == 1 && existing[0].same_content(record) {
                    result.unchanged += 1;
                } else {
                    result.operations.push(Operation {
                        action: Action::Update,
                        record: (*record).clone(),
                        attribution,
                    });
                }
            }
        }
    }

    for (key, existing) in &current {
        if wanted.contains_key(key) {
            continue;
        }
        if !existing.iter().any(|r| ownership.is_owned(r)) {
            result.unmanaged += existing.len();
            continue;
        }
        result.operations.push(Operation {
            action: Action::Delete,
            record: existing[0].clone(),
            attribution: Attribution::StaleRecord,
        });
    }

    result.operations.sort_by(|a, b| {
        let ka = a.record.key();
        let kb = b.record.key();
        (a.action, &ka.zone, &ka.name, ka.rtype, &a.record.server)
            .cmp(&(b.action, &kb.zone, &kb.name, kb.rtype, &b.record.server))
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ObjectKind;
    use crate::sync::record::RecordType;
    use crate::zone::Zone;

    const MARK: &str = "netbox-powerdns-sync";

    fn rec(name: &str, rtype: RecordType, value: &str, ttl: u32) -> DnsRecordState {
        DnsRecordState::new("example.com.", "pdns1", name, rtype, value, ttl)
    }

    fn owned(name: &str, rtype: RecordType, value: &str, ttl: u32) -> DnsRecordState {
        rec(name, rtype, value, ttl).with_comment(MARK)
    }

    fn desired(id: i64, name: &str, value: &str) -> DnsRecordState {
        DnsRecordState {
            origin: Some(ObjectRef { kind: ObjectKind::IpAddress, id }),
            ..rec(name, RecordType::A, value, 3600)
        }
    }

    #[test]
    fn stale_owned_record_is_deleted() {
        let actual = vec![owned("old.example.com.", RecordType::A, "10.0.0.9", 3600)];
        let result = diff(&[], &actual, &OwnershipPolicy::default());
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].action, Action::Delete);
        assert_eq!(result.operations[0].record.name, "old.example.com.");
        assert_eq!(result.operations[0].attribution, Attribution::StaleRecord);
    }

    #[test]
    fn unowned_records_are_never_deleted() {
        let actual = vec![rec("manual.example.com.", RecordType::A, "10.0.0.7", 60)];
        let result = diff(&[], &actual, &OwnershipPolicy::default());
        assert!(result.operations.is_empty());
        assert_eq!(result.unmanaged, 1);

        let dangerous = diff(&[], &actual, &OwnershipPolicy::ManageAllRecords);
        assert_eq!(dangerous.operations.len(), 1);
        assert_eq!(dangerous.operations[0].action, Action::Delete);
    }

    #[test]
    fn unowned_record_blocks_desired_one() {
        let actual = vec![rec("web01.example.com.", RecordType::A, "10.0.0.7", 60)];
        let result = diff(&[desired(1, "web01.example.com.", "10.0.0.5")], &actual, &OwnershipPolicy::default());
        assert!(result.operations.is_empty());
        assert_eq!(result.blocked.len(), 1);
    }

    #[test]
    fn create_update_and_unchanged() {
        let actual = vec![
            owned("same.example.com.", RecordType::A, "10.0.0.1", 3600),
            owned("ttl.example.com.", RecordType::A, "10.0.0.2", 60),
            owned("VALUE.example.com", RecordType::A, "10.0.0.99", 3600),
        ];
        let want = vec![
            desired(1, "same.example.com.", "10.0.0.1"),
            desired(2, "ttl.example.com.", "10.0.0.2"),
            desired(3, "value.example.com.", "10.0.0.3"),
            desired(4, "new.example.com.", "10.0.0.4"),
        ];
        let result = diff(&want, &actual, &OwnershipPolicy::default());
        assert_eq!(result.unchanged, 1);
        let summary: Vec<_> = result
            .operations
            .iter()
            .map(|op| (op.action, op.record.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Action::Create, "new.example.com."),
                (Action::Update, "ttl.example.com."),
                (Action::Update, "value.example.com."),
            ]
        );
        assert_eq!(
            result.operations[0].attribution,
            Attribution::Candidate(ObjectRef { kind: ObjectKind::IpAddress, id: 4 })
        );
    }

    #[test]
    fn multi_value_rrset_is_collapsed_by_update() {
        let actual = vec![
            owned("web.example.com.", RecordType::A, "10.0.0.1", 3600),
            owned("web.example.com.", RecordType::A, "10.0.0.2", 3600),
        ];
        let result = diff(&[desired(1, "web.example.com.", "10.0.0.1")], &actual, &OwnershipPolicy::default());
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].action, Action::Update);
        assert_eq!(result.operations[0].record.value, "10.0.0.1");
        assert_eq!(result.unchanged, 0);
    }

    #[test]
    fn zone_without_ownership_check_manages_unmarked_records() {
        let actual = vec![
            rec("manual.example.com.", RecordType::A, "10.0.0.7", 60),
            rec("web01.example.com.", RecordType::A, "10.0.0.8", 60),
        ];
        let want = vec![desired(1, "web01.example.com.", "10.0.0.5")];
        let mut zone = Zone::new(1, "example.com.");
        zone.check_ownership = false;

        let result = diff(&want, &actual, &zone.ownership(&OwnershipPolicy::default()));
        assert!(result.blocked.is_empty());
        assert_eq!(result.unmanaged, 0);
        let summary: Vec<_> = result
            .operations
            .iter()
            .map(|op| (op.action, op.record.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(Action::Update, "web01.example.com."), (Action::Delete, "manual.example.com.")]
        );

        zone.check_ownership = true;
        let checked = diff(&want, &actual, &zone.ownership(&OwnershipPolicy::default()));
        assert!(checked.operations.is_empty());
        assert_eq!(checked.blocked.len(), 1);
    }

    #[test]
    fn operations_name_their_origin() {
        let result = diff(&[desired(4, "new.example.com.", "10.0.0.4")], &[], &OwnershipPolicy::default());
        assert_eq!(
            result.operations[0].to_string(),
            "CREATE new.example.com. 3600 IN A 10.0.0.4 on pdns1 (from ip-address#4)"
        );
    }

    #[test]
    fn output_order_is_independent_of_input_order() {
        let actual = vec![
            owned("b.example.com.", RecordType::A, "10.0.0.2", 3600),
            owned("a.example.com.", RecordType::A, "10.0.0.1", 3600),
        ];
        let want = vec![desired(2, "d.example.com.", "10.0.0.4"), desired(1, "c.example.com.", "10.0.0.3")];
        let mut reversed_actual = actual.clone();
        reversed_actual.reverse();
        let mut reversed_want = want.clone();
        reversed_want.reverse();

        let names = |r: DiffResult| -> Vec<String> {
            r.operations.iter().map(|o| format!("{} {}", o.action, o.record.name)).collect()
        };
        let first = names(diff(&want, &actual, &OwnershipPolicy::default()));
        let second = names(diff(&reversed_want, &reversed_actual, &OwnershipPolicy::default()));
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                "CREATE c.example.com.",
                "CREATE d.example.com.",
                "DELETE a.example.com.",
                "DELETE b.example.com.",
            ]
        );
    }
}
