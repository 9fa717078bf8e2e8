use super::{EnrollmentListener, EnrollmentScope, ListenerEvent};
use crate::error::AppError;
use crate::store::Store;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use uuid::Uuid;

type EventReceiver = mpsc::UnboundedReceiver<ListenerEvent>;

/// One admin's listening session, shared between its HTTP endpoints.
#[derive(Clone)]
pub struct ListenerHandle {
    pub id: Uuid,
    pub listener: Arc<EnrollmentListener>,
    events: Arc<Mutex<Option<EventReceiver>>>,
}

/// A session's event stream. Dropping it closes the session.
pub struct ListenerEvents {
    receiver: EventReceiver,
    registry: ListenerRegistry,
    id: Uuid,
}

impl Stream for ListenerEvents {
    type Item = ListenerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for ListenerEvents {
    fn drop(&mut self) {
        // Already gone if the client deleted it first.
        let _ = self.registry.close(self.id);
    }
}

/// Enrollment listeners currently attached, by session id.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, ListenerHandle>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called from within a tokio runtime.
    pub fn open(&self, store: &Store, scope: EnrollmentScope) -> ListenerHandle {
        let (listener, events) = EnrollmentListener::attach(store, scope);
        let handle = ListenerHandle {
            id: Uuid::new_v4(),
            listener: Arc::new(listener),
            events: Arc::new(Mutex::new(Some(events))),
        };

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, handle.clone());
        tracing::debug!(listener = %handle.id, "attached enrollment listener");
        handle
    }

    pub fn get(&self, id: Uuid) -> Result<ListenerHandle, AppError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("listener {id}")))
    }

    /// Hands out a session's event stream. There is only one per session.
    pub fn take_events(&self, id: Uuid) -> Result<ListenerEvents, AppError> {
        let receiver = self
            .get(id)?
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| AppError::Conflict(format!("listener {id} already has a stream")))?;
        Ok(ListenerEvents {
            receiver,
            registry: self.clone(),
            id,
        })
    }

    /// Forgets a session. Its subscription ends once no request still holds it.
    pub fn close(&self, id: Uuid) -> Result<(), AppError> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(_) => {
                tracing::debug!(listener = %id, "detached enrollment listener");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("listener {id}"))),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
