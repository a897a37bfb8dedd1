//! Gate roster: visitors joined to the personnel they came to see.
//!
//! Pure projection over two live collections; recomputed whenever either
//! subscription delivers a new snapshot.

use std::collections::HashMap;

use crate::record::{Personnel, Visitor, VisitorStatus};

/// One visitor and the personnel record they are visiting, if it still exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    pub visitor: Visitor,
    pub host: Option<Personnel>,
}

/// Current visitors with their hosts resolved, plus headline counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    /// Entries in visitor snapshot order.
    pub entries: Vec<RosterEntry>,
    pub on_site: usize,
    pub overstaying: usize,
    /// Personnel with `Active` status.
    pub active_personnel: usize,
}

impl Roster {
    pub fn build(personnel: &[Personnel], visitors: &[Visitor]) -> Self {
        let by_id: HashMap<&str, &Personnel> =
            personnel.iter().map(|p| (p.id.as_str(), p)).collect();

        let entries: Vec<RosterEntry> = visitors
            .iter()
            .map(|v| RosterEntry {
                visitor: v.clone(),
                host: by_id.get(v.visiting_personnel_id.as_str()).map(|p| (*p).clone()),
            })
            .collect();

        let overstaying = visitors
            .iter()
            .filter(|v| v.status == VisitorStatus::Overstaying)
            .count();

        Self {
            entries,
            on_site: visitors.len(),
            overstaying,
            active_personnel: personnel
                .iter()
                .filter(|p| p.status == crate::record::PersonnelStatus::Active)
                .count(),
        }
    }

    /// Visitors whose host is not in the personnel collection.
    pub fn orphans(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter().filter(|e| e.host.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PersonnelStatus;

    fn person(id: &str, status: PersonnelStatus) -> Personnel {
        Personnel {
            id: id.into(),
            name: format!("Person {id}"),
            rank: "Cadet".into(),
            force_id: "F0000".into(),
            department: "Logistics".into(),
            facility: "Military Camp Alpha".into(),
            block: "Upper Block".into(),
            room: "Room 1".into(),
            status,
            user_id: None,
        }
    }

    fn visitor(id: &str, host: &str, status: VisitorStatus) -> Visitor {
        Visitor {
            id: id.into(),
            name: format!("Visitor {id}"),
            photo_id: None,
            visiting_personnel_id: host.into(),
            time_in: "10:00".into(),
            status,
        }
    }

    #[test]
    fn test_build_joins_and_counts() {
        let personnel = vec![
            person("p1", PersonnelStatus::Active),
            person("p2", PersonnelStatus::OnLeave),
        ];
        let visitors = vec![
            visitor("v1", "p1", VisitorStatus::OnSite),
            visitor("v2", "p2", VisitorStatus::Overstaying),
            visitor("v3", "p9", VisitorStatus::OnSite),
        ];

        let roster = Roster::build(&personnel, &visitors);
        assert_eq!(roster.on_site, 3);
        assert_eq!(roster.overstaying, 1);
        assert_eq!(roster.active_personnel, 1);
        assert_eq!(roster.entries[0].host.as_ref().map(|p| p.id.as_str()), Some("p1"));
        assert_eq!(roster.entries[2].host, None);
        assert_eq!(roster.orphans().count(), 1);
    }

    #[test]
    fn test_empty_roster() {
        let roster = Roster::build(&[], &[]);
        assert_eq!(roster, Roster::default());
    }
}
