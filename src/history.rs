//! Target grade history records.
//!
//! Raw server payloads are normalized into [`HistoryRecord`]s here: invalid
//! entries are dropped, grade codes are translated and the set is sorted
//! newest first.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::grades::{translate, GradeCode, GradeLookup};

// API Response models
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    /// Entries stay untyped until normalization so one bad entry is skipped
    /// rather than failing the whole payload.
    #[serde(default)]
    pub target_grade_histories: Vec<Value>,
    /// Only sent by the paginated histories endpoint.
    #[serde(default)]
    pub total_histories: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHistory {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub previous_grade: Option<GradeCode>,
    #[serde(default)]
    pub new_grade: Option<GradeCode>,
    #[serde(default)]
    pub changed_at: Option<String>,
    #[serde(default)]
    pub changed_by: Option<RawUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    pub id: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Snapshot of the user who made a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: u64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub nickname: Option<String>,
}

impl UserRef {
    /// Name to show next to a change: nickname if set, otherwise full name,
    /// otherwise the username.
    pub fn display_name(&self) -> String {
        if let Some(nick) = self.nickname.as_deref().filter(|n| !n.trim().is_empty()) {
            return nick.to_string();
        }
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

impl From<RawUser> for UserRef {
    fn from(raw: RawUser) -> Self {
        UserRef {
            id: raw.id,
            email: raw.email.unwrap_or_default(),
            first_name: raw.first_name.unwrap_or_default(),
            last_name: raw.last_name.unwrap_or_default(),
            username: raw.username.unwrap_or_default(),
            nickname: raw.nickname,
        }
    }
}

/// One grade transition, with labels already translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: Option<u64>,
    pub previous_grade: String,
    pub new_grade: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by: UserRef,
}

/// Why a raw entry was left out of the history set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Entry doesn't have the shape of a history entry at all.
    Malformed,
    MissingGrade,
    BadTimestamp,
    MissingAuthor,
}

impl RawHistory {
    pub fn from_value(value: Value) -> Result<Self, SkipReason> {
        serde_json::from_value(value).map_err(|e| {
            tracing::debug!(error = %e, "Malformed target grade history entry");
            SkipReason::Malformed
        })
    }

    /// Build a display record, or say why this entry is not a valid transition.
    pub fn normalize(self, lookup: &dyn GradeLookup) -> Result<HistoryRecord, SkipReason> {
        let (previous, new) = match (self.previous_grade, self.new_grade) {
            (Some(previous), Some(new)) => (previous, new),
            _ => return Err(SkipReason::MissingGrade),
        };

        let changed_at = self
            .changed_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(SkipReason::BadTimestamp)?;

        let changed_by = self.changed_by.ok_or(SkipReason::MissingAuthor)?;

        Ok(HistoryRecord {
            id: self.id,
            previous_grade: translate(lookup, &previous),
            new_grade: translate(lookup, &new),
            changed_at,
            changed_by: changed_by.into(),
        })
    }
}

/// Filter, translate and sort a raw payload into a candidate history set.
pub fn normalize_all(raw: Vec<Value>, lookup: &dyn GradeLookup) -> Vec<HistoryRecord> {
    let mut records: Vec<HistoryRecord> = raw
        .into_iter()
        .filter_map(|value| {
            let id = value.get("id").and_then(Value::as_u64);
            match RawHistory::from_value(value).and_then(|entry| entry.normalize(lookup)) {
                Ok(record) => Some(record),
                Err(reason) => {
                    tracing::debug!(history_id = ?id, ?reason, "Skipping target grade history entry");
                    None
                }
            }
        })
        .collect();

    sort_newest_first(&mut records);
    records
}

/// Stable sort by change time, newest first. Equal timestamps keep their
/// input order so same-second changes don't swap places between polls.
pub fn sort_newest_first(records: &mut [HistoryRecord]) {
    records.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
}

/// Whether `candidate` differs from what is currently held.
pub fn has_changed(current: &[HistoryRecord], candidate: &[HistoryRecord]) -> bool {
    current != candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades::GradeTable;
    use serde_json::json;

    fn raw(id: u64, prev: Option<i64>, new: Option<i64>, at: &str) -> Value {
        json!({
            "id": id,
            "previous_grade": prev,
            "new_grade": new,
            "changed_at": at,
            "changed_by": {
                "id": 1,
                "email": "user1@example.com",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "username": "user1",
                "nickname": null
            }
        })
    }

    fn entry(id: u64, prev: Option<i64>, new: Option<i64>, at: &str) -> RawHistory {
        RawHistory::from_value(raw(id, prev, new, at)).unwrap()
    }

    #[test]
    fn test_sorted_newest_first() {
        let table = GradeTable::doubtfire();
        let records = normalize_all(
            vec![
                raw(1, Some(0), Some(1), "2024-05-01T10:00:00Z"),
                raw(2, Some(1), Some(2), "2024-05-01T10:05:00Z"),
            ],
            &table,
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, Some(2));
        assert_eq!(records[0].previous_grade, "Credit");
        assert_eq!(records[0].new_grade, "Distinction");
        assert_eq!(records[1].id, Some(1));
        assert_eq!(records[1].previous_grade, "Pass");
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let table = GradeTable::doubtfire();
        let records = normalize_all(
            vec![
                raw(1, Some(0), Some(1), "2024-05-01T10:00:00Z"),
                raw(2, Some(1), Some(2), "2024-05-01T11:00:00Z"),
                raw(3, Some(2), Some(3), "2024-05-01T10:00:00Z"),
                raw(4, Some(3), Some(0), "2024-05-01T10:00:00Z"),
            ],
            &table,
        );

        let ids: Vec<_> = records.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_missing_grade_is_excluded() {
        let table = GradeTable::doubtfire();
        let records = normalize_all(
            vec![
                raw(1, None, Some(1), "2024-05-01T10:00:00Z"),
                raw(2, Some(1), None, "2024-05-01T10:01:00Z"),
                raw(3, Some(1), Some(2), "2024-05-01T10:02:00Z"),
            ],
            &table,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(3));
    }

    #[test]
    fn test_null_grade_in_payload_is_excluded() {
        let payload = r#"{
            "target_grade_histories": [
                {"id": 1, "previous_grade": null, "new_grade": 2,
                 "changed_at": "2024-05-01T10:00:00Z",
                 "changed_by": {"id": 7, "email": "a@b.c", "first_name": "A",
                                "last_name": "B", "username": "ab", "nickname": null}},
                {"id": 2, "new_grade": 2,
                 "changed_at": "2024-05-01T10:00:00Z",
                 "changed_by": {"id": 7}}
            ]
        }"#;
        let response: HistoryResponse = serde_json::from_str(payload).unwrap();
        let records = normalize_all(response.target_grade_histories, &GradeTable::doubtfire());
        assert!(records.is_empty());
    }

    #[test]
    fn test_malformed_entry_skipped_not_fatal() {
        let payload = r#"{
            "target_grade_histories": [
                {"id": 1, "previous_grade": 0, "new_grade": 1,
                 "changed_at": "2024-05-01T10:00:00Z",
                 "changed_by": {"id": 7, "email": "a@b.c", "first_name": "A",
                                "last_name": "B", "username": "ab", "nickname": null}},
                {"id": 2, "previous_grade": 1, "new_grade": 2,
                 "changed_at": 1714557600,
                 "changed_by": {"id": 7}},
                {"id": 3, "previous_grade": 1.5, "new_grade": 2,
                 "changed_at": "2024-05-01T10:00:00Z",
                 "changed_by": {"id": 7}},
                {"id": 4, "previous_grade": 1, "new_grade": 2,
                 "changed_at": "2024-05-01T10:00:00Z",
                 "changed_by": {"id": null}},
                "not an object"
            ]
        }"#;
        let response: HistoryResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.target_grade_histories.len(), 5);

        let records = normalize_all(response.target_grade_histories, &GradeTable::doubtfire());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(1));
    }

    #[test]
    fn test_null_user_fields_are_tolerated() {
        let table = GradeTable::doubtfire();
        let value = json!({
            "id": 9,
            "previous_grade": 0,
            "new_grade": 3,
            "changed_at": "2024-05-01T10:00:00Z",
            "changed_by": {"id": 4, "email": null, "first_name": null,
                           "last_name": null, "username": "tutor4", "nickname": null}
        });

        let records = normalize_all(vec![value], &table);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].changed_by.email, "");
        assert_eq!(records[0].changed_by.display_name(), "tutor4");
    }

    #[test]
    fn test_skip_reasons() {
        let table = GradeTable::doubtfire();

        let bad_time = entry(1, Some(0), Some(1), "yesterday");
        assert_eq!(bad_time.normalize(&table), Err(SkipReason::BadTimestamp));

        let mut no_author = entry(2, Some(0), Some(1), "2024-05-01T10:00:00Z");
        no_author.changed_by = None;
        assert_eq!(no_author.normalize(&table), Err(SkipReason::MissingAuthor));

        let no_grade = entry(3, None, None, "2024-05-01T10:00:00Z");
        assert_eq!(no_grade.normalize(&table), Err(SkipReason::MissingGrade));

        let not_entry = RawHistory::from_value(json!({"changed_at": 17}));
        assert_eq!(not_entry.unwrap_err(), SkipReason::Malformed);
    }

    #[test]
    fn test_timestamp_offsets_normalize_to_utc() {
        let table = GradeTable::doubtfire();
        let record = entry(1, Some(0), Some(1), "2024-05-01T20:00:00+10:00")
            .normalize(&table)
            .unwrap();
        assert_eq!(record.changed_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_unknown_code_shows_placeholder() {
        let table = GradeTable::doubtfire();
        let record = entry(1, Some(9), Some(1), "2024-05-01T10:00:00Z")
            .normalize(&table)
            .unwrap();
        assert_eq!(record.previous_grade, "N/A");
        assert_eq!(record.new_grade, "Credit");
    }

    #[test]
    fn test_has_changed() {
        let table = GradeTable::doubtfire();
        let a = normalize_all(vec![raw(1, Some(0), Some(1), "2024-05-01T10:00:00Z")], &table);
        let same = normalize_all(vec![raw(1, Some(0), Some(1), "2024-05-01T10:00:00Z")], &table);
        let longer = normalize_all(
            vec![
                raw(1, Some(0), Some(1), "2024-05-01T10:00:00Z"),
                raw(2, Some(1), Some(2), "2024-05-01T10:01:00Z"),
            ],
            &table,
        );
        let edited = normalize_all(vec![raw(1, Some(0), Some(2), "2024-05-01T10:00:00Z")], &table);

        assert!(!has_changed(&a, &same));
        assert!(has_changed(&a, &longer));
        assert!(has_changed(&a, &edited));
        assert!(has_changed(&[], &a));
        assert!(!has_changed(&[], &[]));
    }

    #[test]
    fn test_display_name() {
        let mut u = entry(1, Some(0), Some(1), "2024-05-01T10:00:00Z")
            .normalize(&GradeTable::doubtfire())
            .unwrap()
            .changed_by;
        assert_eq!(u.display_name(), "Ada Lovelace");

        u.nickname = Some("Countess".to_string());
        assert_eq!(u.display_name(), "Countess");

        u.nickname = Some("  ".to_string());
        u.first_name.clear();
        u.last_name.clear();
        assert_eq!(u.display_name(), "user1");
    }
}
