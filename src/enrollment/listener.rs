use super::EnrollmentScope;
use crate::documents::PendingEnrollment;
use crate::error::AppError;
use crate::store::{DocumentChange, Snapshot, Store, Subscription};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// A user-facing toast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ListenerEvent {
    DeviceDetected(Notification),
    /// The confirmation dialog opened for this record.
    PromptOpened(PendingEnrollment),
}

struct ListenerState {
    scope: EnrollmentScope,
    // Checked and set in one step when a record arrives, never from a later read.
    dialog_open: AtomicBool,
    prompt: Mutex<Option<PendingEnrollment>>,
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl ListenerState {
    /// Opens the dialog for `pending` unless one is already open.
    fn offer(&self, pending: PendingEnrollment) -> bool {
        if self.dialog_open.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                enrollment = %pending.id,
                "dialog already open, not surfacing pending enrollment"
            );
            return false;
        }

        tracing::info!(
            enrollment = %pending.id,
            classroom = %pending.classroom_id,
            "surfacing pending enrollment"
        );
        let notification = Notification {
            title: "Device detected".to_string(),
            description: format!(
                "{} ({}) is waiting to be enrolled.",
                pending.device_info.model, pending.device_info.mac_address
            ),
        };
        *self.prompt.lock().unwrap_or_else(PoisonError::into_inner) = Some(pending.clone());

        // The receiving side may have gone away; the prompt still stands.
        let _ = self.events.send(ListenerEvent::DeviceDetected(notification));
        let _ = self.events.send(ListenerEvent::PromptOpened(pending));
        true
    }

    fn on_snapshot(&self, result: Result<Snapshot<PendingEnrollment>, AppError>) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    institution = %self.scope.institution_id,
                    classroom = %self.scope.classroom_id,
                    error = %err,
                    "enrollment listener stopped"
                );
                return;
            }
        };

        for change in snapshot.changes {
            if let DocumentChange::Added(pending) = change {
                self.offer(pending);
            }
        }
    }
}

/// Watches one classroom for pending enrollments and prompts for one at a time.
///
/// Records that arrive while a prompt is open are not queued. They are offered
/// again on [`EnrollmentListener::refresh`] or by the next listener attached.
pub struct EnrollmentListener {
    state: Arc<ListenerState>,
    subscription: Subscription,
}

impl EnrollmentListener {
    /// Starts listening. An incomplete scope watches nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(
        store: &Store,
        scope: EnrollmentScope,
    ) -> (EnrollmentListener, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(ListenerState {
            scope: scope.clone(),
            dialog_open: AtomicBool::new(false),
            prompt: Mutex::new(None),
            events,
        });

        let subscription = if scope.is_complete() {
            let watcher = Arc::clone(&state);
            let query = scope.clone();
            store.watch(
                scope.watch_scope(),
                move |store| store.pending_enrollments(&query),
                move |result| watcher.on_snapshot(result),
            )
        } else {
            Subscription::inert()
        };

        (EnrollmentListener { state, subscription }, receiver)
    }

    pub fn scope(&self) -> &EnrollmentScope {
        &self.state.scope
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn is_dialog_open(&self) -> bool {
        self.state.dialog_open.load(Ordering::SeqCst)
    }

    /// The record the open dialog is asking about.
    pub fn prompt(&self) -> Option<PendingEnrollment> {
        self.state
            .prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Closes the dialog, whether it was confirmed or cancelled.
    /// A cancelled record stays pending.
    pub fn close_dialog(&self) -> Option<PendingEnrollment> {
        let closed = self
            .state
            .prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state.dialog_open.store(false, Ordering::SeqCst);
        closed
    }

    /// Closes the dialog only if it is asking about `enrollment_id`.
    pub fn close_dialog_for(&self, enrollment_id: &str) -> bool {
        let mut prompt = self
            .state
            .prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if prompt
            .as_ref()
            .is_none_or(|pending| pending.id != enrollment_id)
        {
            return false;
        }
        *prompt = None;
        self.state.dialog_open.store(false, Ordering::SeqCst);
        true
    }

    /// Re-offers the most recent pending record still in scope, if no dialog is open.
    pub async fn refresh(&self, store: &Store) -> Result<Option<PendingEnrollment>, AppError> {
        if !self.state.scope.is_complete() || self.is_dialog_open() {
            return Ok(None);
        }

        let scope = self.state.scope.clone();
        let latest = store
            .run(move |store| store.pending_enrollments(&scope))
            .await?
            .into_iter()
            .next();

        Ok(latest.filter(|pending| self.state.offer(pending.clone())))
    }

    pub fn detach(self) {
        self.subscription.unsubscribe();
    }
}
