use super::Store;
use crate::documents::{PendingEnrollment, Student};
use crate::error::AppError;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

// Slow subscribers beyond this many batches are cut off.
const FEED_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    PendingEnrollments,
    Students,
}

/// Identifies one document touched by a committed batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeNotice {
    pub collection: Collection,
    pub institution_id: String,
    pub classroom_id: String,
    pub document_id: String,
}

impl ChangeNotice {
    pub fn new(
        collection: Collection,
        institution_id: String,
        classroom_id: String,
        document_id: String,
    ) -> Self {
        ChangeNotice {
            collection,
            institution_id,
            classroom_id,
            document_id,
        }
    }
}

/// Everything one commit changed. Subscribers see it as a single notification.
#[derive(Clone, Debug, Default)]
pub struct ChangeBatch {
    pub notices: Vec<ChangeNotice>,
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Arc<ChangeBatch>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        ChangeFeed { sender }
    }

    pub fn publish(&self, batch: ChangeBatch) {
        if batch.notices.is_empty() {
            return;
        }
        // No subscribers is not an error.
        let _ = self.sender.send(Arc::new(batch));
    }

    pub fn subscribe_raw(&self) -> broadcast::Receiver<Arc<ChangeBatch>> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Which notices wake a subscription up.
#[derive(Clone, Debug)]
pub struct WatchScope {
    pub collection: Collection,
    pub institution_id: String,
    pub classroom_id: Option<String>,
}

impl WatchScope {
    pub fn classroom(collection: Collection, institution_id: &str, classroom_id: &str) -> Self {
        WatchScope {
            collection,
            institution_id: institution_id.to_string(),
            classroom_id: Some(classroom_id.to_string()),
        }
    }

    pub fn institution(collection: Collection, institution_id: &str) -> Self {
        WatchScope {
            collection,
            institution_id: institution_id.to_string(),
            classroom_id: None,
        }
    }

    pub fn matches(&self, notice: &ChangeNotice) -> bool {
        notice.collection == self.collection
            && notice.institution_id == self.institution_id
            && self
                .classroom_id
                .as_ref()
                .is_none_or(|classroom_id| *classroom_id == notice.classroom_id)
    }
}

/// A record that can be tracked across snapshots.
pub trait Document: Clone + PartialEq + Send + 'static {
    fn document_id(&self) -> &str;
}

impl Document for PendingEnrollment {
    fn document_id(&self) -> &str {
        &self.id
    }
}

impl Document for Student {
    fn document_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DocumentChange<T> {
    Added(T),
    Modified(T),
    Removed(T),
}

/// The full result set of a watched query plus what changed since the previous delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<T> {
    pub documents: Vec<T>,
    pub changes: Vec<DocumentChange<T>>,
}

impl<T: Document> Snapshot<T> {
    /// Changes are reported in query order, removals last.
    pub fn diff(previous: &[T], documents: Vec<T>) -> Self {
        let find = |set: &[T], id: &str| -> Option<usize> {
            set.iter().position(|doc| doc.document_id() == id)
        };

        let mut changes = Vec::new();
        for doc in &documents {
            match find(previous, doc.document_id()) {
                None => changes.push(DocumentChange::Added(doc.clone())),
                Some(index) if previous[index] != *doc => {
                    changes.push(DocumentChange::Modified(doc.clone()));
                }
                Some(_) => {}
            }
        }
        for old in previous {
            if find(&documents, old.document_id()).is_none() {
                changes.push(DocumentChange::Removed(old.clone()));
            }
        }

        Snapshot { documents, changes }
    }
}

/// Cancellation handle for a watch. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// A handle that watches nothing.
    pub fn inert() -> Self {
        Subscription { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Store {
    /// Watches a query in real time.
    ///
    /// `on_snapshot` first receives the initial result set (every document reported as
    /// added), then one snapshot per committed batch touching `scope` that changed the
    /// result. An error is delivered at most once and ends the subscription.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch<T, L, F>(&self, scope: WatchScope, load: L, mut on_snapshot: F) -> Subscription
    where
        T: Document,
        L: Fn(&Store) -> Result<Vec<T>, AppError> + Send + Sync + 'static,
        F: FnMut(Result<Snapshot<T>, AppError>) + Send + 'static,
    {
        // Subscribe before the first load so no commit can slip between the two.
        let mut receiver = self.feed.subscribe_raw();
        let store = self.clone();
        let load = Arc::new(load);

        let task = tokio::spawn(async move {
            let mut previous: Vec<T> = Vec::new();
            let mut initial = true;

            loop {
                let loader = Arc::clone(&load);
                let documents = match store.run(move |store| loader(store)).await {
                    Ok(documents) => documents,
                    Err(err) => {
                        on_snapshot(Err(err));
                        return;
                    }
                };

                let snapshot = Snapshot::diff(&previous, documents);
                previous = snapshot.documents.clone();
                if initial || !snapshot.changes.is_empty() {
                    on_snapshot(Ok(snapshot));
                }
                initial = false;

                loop {
                    match receiver.recv().await {
                        Ok(batch) if batch.notices.iter().any(|notice| scope.matches(notice)) => {
                            break;
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscription lagged behind the change feed");
                            on_snapshot(Err(AppError::SubscriptionLagged));
                            return;
                        }
                        Err(RecvError::Closed) => return,
                    }
                }
            }
        });

        Subscription { task: Some(task) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::DeviceInfo;
    use crate::store::testing::temp_store;
    use crate::store::{WriteBatch, WriteOp};
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::sync::mpsc;

    fn pending(id: &str, institution_id: &str, classroom_id: &str) -> PendingEnrollment {
        PendingEnrollment {
            id: id.to_string(),
            institution_id: institution_id.to_string(),
            classroom_id: classroom_id.to_string(),
            device_info: DeviceInfo {
                mac_address: format!("mac-{id}"),
                model: "Tab A8".to_string(),
            },
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn load_all(store: &Store) -> Result<Vec<PendingEnrollment>, AppError> {
        store.with_connection(|conn| {
            use crate::database::{PendingEnrollmentRow, pending_enrollments};
            use diesel::prelude::*;
            let rows = pending_enrollments::table
                .filter(pending_enrollments::institution_id.eq("I1"))
                .order(pending_enrollments::id.asc())
                .select(PendingEnrollmentRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(PendingEnrollment::from).collect())
        })
    }

    #[test]
    fn diff_reports_added_modified_and_removed() {
        let a = pending("A", "I1", "C1");
        let b = pending("B", "I1", "C1");
        let mut b_moved = b.clone();
        b_moved.classroom_id = "C2".to_string();
        let c = pending("C", "I1", "C1");

        let snapshot = Snapshot::diff(&[a.clone(), b], vec![b_moved.clone(), c.clone()]);

        assert_eq!(
            snapshot.changes,
            vec![
                DocumentChange::Modified(b_moved),
                DocumentChange::Added(c),
                DocumentChange::Removed(a),
            ]
        );
    }

    #[test]
    fn scope_matches_institution_and_classroom() {
        let notice = ChangeNotice::new(
            Collection::PendingEnrollments,
            "I1".into(),
            "C1".into(),
            "E1".into(),
        );
        assert!(WatchScope::classroom(Collection::PendingEnrollments, "I1", "C1").matches(&notice));
        assert!(WatchScope::institution(Collection::PendingEnrollments, "I1").matches(&notice));
        assert!(!WatchScope::classroom(Collection::PendingEnrollments, "I1", "C2").matches(&notice));
        assert!(!WatchScope::institution(Collection::PendingEnrollments, "I2").matches(&notice));
        assert!(!WatchScope::institution(Collection::Students, "I1").matches(&notice));
    }

    #[tokio::test]
    async fn watch_delivers_initial_then_incremental_snapshots() {
        let (store, _dir) = temp_store();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let subscription = store.watch(
            WatchScope::institution(Collection::PendingEnrollments, "I1"),
            load_all,
            move |result| {
                let _ = sender.send(result);
            },
        );

        let initial = receiver.recv().await.expect("initial snapshot").expect("ok");
        assert!(initial.documents.is_empty());

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreatePending(pending("E1", "I1", "C1")));
        store.commit(batch).expect("commit");

        let next = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("snapshot in time")
            .expect("channel open")
            .expect("ok");
        assert_eq!(next.documents.len(), 1);
        assert!(matches!(&next.changes[..], [DocumentChange::Added(doc)] if doc.id == "E1"));

        assert!(subscription.is_active());
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn unrelated_commits_do_not_wake_the_watch() {
        let (store, _dir) = temp_store();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = store.watch(
            WatchScope::institution(Collection::PendingEnrollments, "I1"),
            load_all,
            move |result| {
                let _ = sender.send(result);
            },
        );
        receiver.recv().await.expect("initial snapshot").expect("ok");

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreatePending(pending("E9", "I2", "C1")));
        store.commit(batch).expect("commit");

        let waited = tokio::time::timeout(Duration::from_millis(200), receiver.recv()).await;
        assert!(waited.is_err(), "no snapshot for another institution");
    }
}
