// ============================================================================
// Three-way Rollback
// ============================================================================
//
// Reverting an optimistic patch compares three values of one entry: what it
// held before the patch, what the patch produced, and what it holds now.
// Records, and fields within records, that still carry what the patch wrote
// go back to their previous value. Anything changed since is kept, so a
// later write to the same record wins while an unrelated change elsewhere in
// the entry does not block the rollback.
//
// ============================================================================

use super::CachedValue;
use crate::model::{
    ActivityFeed, ActivityView, DocumentDetail, DocumentSummary, DocumentsPage, RevisionView,
};
use im::Vector;
use uuid::Uuid;

pub(crate) trait Revert {
    /// Undoes in `self` what `patched` changed relative to `previous`.
    fn revert(&mut self, previous: &Self, patched: &Self);
}

/// Identity of a record inside a cached collection.
trait Keyed {
    fn record_id(&self) -> Uuid;
}

macro_rules! revert_fields {
    ($current:ident, $previous:ident, $patched:ident; $($field:ident),+ $(,)?) => {
        $(
            if $current.$field == $patched.$field {
                $current.$field = $previous.$field.clone();
            }
        )+
    };
}

macro_rules! keyed {
    ($($ty:ty),+) => {
        $(
            impl Keyed for $ty {
                fn record_id(&self) -> Uuid {
                    self.id
                }
            }
        )+
    };
}

keyed!(DocumentSummary, RevisionView, ActivityView);

fn find<T: Keyed + Clone>(items: &Vector<T>, id: Uuid) -> Option<&T> {
    items.iter().find(|item| item.record_id() == id)
}

fn revert_records<T>(current: &mut Vector<T>, previous: &Vector<T>, patched: &Vector<T>)
where
    T: Keyed + Revert + Clone + PartialEq,
{
    let mut merged = Vector::new();
    for item in current.iter() {
        let id = item.record_id();
        match (find(patched, id), find(previous, id)) {
            // Inserted by the patch and untouched since.
            (Some(written), None) if written == item => {}
            (Some(written), Some(before)) => {
                let mut item = item.clone();
                item.revert(before, written);
                merged.push_back(item);
            }
            _ => merged.push_back(item.clone()),
        }
    }

    // Records the patch removed return after their nearest surviving
    // predecessor, unless something has put them back already.
    for (index, item) in previous.iter().enumerate() {
        let id = item.record_id();
        if find(patched, id).is_some() || find(&merged, id).is_some() {
            continue;
        }
        let at = previous
            .iter()
            .take(index)
            .rev()
            .find_map(|before| {
                merged
                    .iter()
                    .position(|kept| kept.record_id() == before.record_id())
            })
            .map_or(0, |position| position + 1);
        merged.insert(at, item.clone());
    }
    *current = merged;
}

impl Revert for DocumentSummary {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        revert_fields!(self, previous, patched; title, content, updated_at, author, counts);
    }
}

impl Revert for RevisionView {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        revert_fields!(self, previous, patched; content, status, updated_at, author, activities);
    }
}

impl Revert for ActivityView {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        revert_fields!(self, previous, patched; action_type, created_at, document_id, actor, document);
    }
}

impl Revert for DocumentsPage {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        revert_records(&mut self.documents, &previous.documents, &patched.documents);
        revert_fields!(self, previous, patched; next_cursor);
    }
}

impl Revert for ActivityFeed {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        revert_records(&mut self.activities, &previous.activities, &patched.activities);
        revert_fields!(self, previous, patched; next_cursor);
    }
}

impl Revert for DocumentDetail {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        revert_fields!(self, previous, patched; title, content, created_at, updated_at, deleted_at, author);
        revert_records(&mut self.revisions, &previous.revisions, &patched.revisions);
    }
}

impl Revert for CachedValue {
    fn revert(&mut self, previous: &Self, patched: &Self) {
        match (self, previous, patched) {
            (CachedValue::DocumentsPage(current), CachedValue::DocumentsPage(before), CachedValue::DocumentsPage(written)) => {
                current.revert(before, written)
            }
            (CachedValue::DocumentDetail(current), CachedValue::DocumentDetail(before), CachedValue::DocumentDetail(written)) => {
                current.revert(before, written)
            }
            (CachedValue::ActivityFeed(current), CachedValue::ActivityFeed(before), CachedValue::ActivityFeed(written)) => {
                current.revert(before, written)
            }
            (current, before, written) => {
                if *current == *written {
                    *current = before.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProfileRef, RevisionCounts};
    use chrono::{DateTime, Utc};

    fn doc(id: Uuid, title: &str) -> DocumentSummary {
        DocumentSummary {
            id,
            title: title.to_string(),
            content: String::new(),
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            author: ProfileRef::new(Uuid::nil(), "author@example.com"),
            counts: RevisionCounts::default(),
        }
    }

    fn page(docs: &[DocumentSummary]) -> DocumentsPage {
        DocumentsPage {
            documents: docs.iter().cloned().collect(),
            next_cursor: None,
        }
    }

    #[test]
    fn test_revert_keeps_unrelated_record_changes() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let previous = page(&[doc(a, "Old"), doc(b, "Other")]);
        let patched = page(&[doc(a, "New"), doc(b, "Other")]);
        let mut current = page(&[doc(a, "New"), doc(b, "Other v2")]);

        current.revert(&previous, &patched);
        assert_eq!(current, page(&[doc(a, "Old"), doc(b, "Other v2")]));
    }

    #[test]
    fn test_revert_keeps_later_field_write() {
        let a = Uuid::new_v4();
        let previous = page(&[doc(a, "Draft")]);
        let patched = page(&[doc(a, "First")]);
        let mut later = doc(a, "Second");
        later.content = "Body".into();
        let mut current = page(&[later.clone()]);

        current.revert(&previous, &patched);
        assert_eq!(current, page(&[later]));
    }

    #[test]
    fn test_revert_restores_removed_record_in_place() {
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let previous = page(&[doc(a, "A"), doc(b, "B"), doc(c, "C")]);
        let patched = page(&[doc(a, "A"), doc(c, "C")]);
        // A realtime insert landed at the front meanwhile.
        let mut current = page(&[doc(d, "D"), doc(a, "A"), doc(c, "C")]);

        current.revert(&previous, &patched);
        assert_eq!(current, page(&[doc(d, "D"), doc(a, "A"), doc(b, "B"), doc(c, "C")]));
    }

    #[test]
    fn test_revert_drops_inserted_record() {
        let (a, fresh) = (Uuid::new_v4(), Uuid::new_v4());
        let previous = page(&[doc(a, "A")]);
        let patched = page(&[doc(fresh, "Fresh"), doc(a, "A")]);
        let mut current = page(&[doc(fresh, "Fresh"), doc(a, "A v2")]);

        current.revert(&previous, &patched);
        assert_eq!(current, page(&[doc(a, "A v2")]));
    }
}
