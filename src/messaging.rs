//! Admin-to-student messages, screened before they are stored.

use crate::config::ModerationConfig;
use crate::database::{MessageRow, messages};
use crate::documents::Message;
use crate::error::{AppError, Operation};
use crate::session::InstitutionContext;
use crate::store::Store;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModerationVerdict {
    pub fn accept() -> Self {
        ModerationVerdict {
            is_valid: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        ModerationVerdict {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a message is appropriate to send to a student.
pub trait MessageModerator: Send + Sync {
    fn review(&self, body: &str) -> ModerationVerdict;
}

/// Refuses messages that are too long or contain a configured term.
pub struct KeywordModerator {
    blocked_terms: Vec<String>,
    max_length: usize,
}

impl KeywordModerator {
    pub fn new(config: &ModerationConfig) -> Self {
        KeywordModerator {
            blocked_terms: config
                .blocked_terms
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
            max_length: config.max_length,
        }
    }
}

impl MessageModerator for KeywordModerator {
    fn review(&self, body: &str) -> ModerationVerdict {
        if body.chars().count() > self.max_length {
            return ModerationVerdict::reject(format!(
                "messages are limited to {} characters",
                self.max_length
            ));
        }

        let lowered = body.to_lowercase();
        match self
            .blocked_terms
            .iter()
            .find(|term| lowered.contains(term.as_str()))
        {
            Some(term) => ModerationVerdict::reject(format!("contains blocked term {term:?}")),
            None => ModerationVerdict::accept(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub student_id: String,
    pub body: String,
}

impl Store {
    /// Screens and stores a message. A rejected message is not stored.
    pub fn send_message(
        &self,
        ctx: &InstitutionContext,
        sender_id: &str,
        request: NewMessage,
        moderator: &dyn MessageModerator,
    ) -> Result<Message, AppError> {
        let body = request.body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("message body is required".into()));
        }
        let student = self.student(ctx, &request.student_id)?;

        let verdict = moderator.review(body);
        if !verdict.is_valid {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "the message is not appropriate for students".to_string());
            tracing::info!(student = %student.id, %reason, "message rejected by moderation");
            return Err(AppError::ModerationRejected(reason));
        }

        let row = MessageRow {
            id: Uuid::new_v4().simple().to_string(),
            institution_id: ctx.institution_id().to_string(),
            student_id: student.id,
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            sent_at: OffsetDateTime::now_utc(),
            read_confirmation: false,
        };
        self.with_connection(|conn| {
            diesel::insert_into(messages::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })?;

        tracing::info!(message = %row.id, student = %row.student_id, "sent message");
        Ok(row.into())
    }

    /// Messages sent to one student, newest first.
    pub fn messages_for(
        &self,
        ctx: &InstitutionContext,
        student_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        self.student(ctx, student_id)?;
        self.with_connection(|conn| {
            let rows = messages::table
                .filter(messages::institution_id.eq(ctx.institution_id()))
                .filter(messages::student_id.eq(student_id))
                .order((messages::sent_at.desc(), messages::id.desc()))
                .select(MessageRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Message::from).collect())
        })
    }

    /// Records that the student's device displayed the message.
    pub fn mark_message_read(
        &self,
        ctx: &InstitutionContext,
        message_id: &str,
    ) -> Result<Message, AppError> {
        self.with_connection(|conn| {
            let row = messages::table
                .find(message_id)
                .select(MessageRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))?;
            if row.institution_id != ctx.institution_id() {
                return Err(AppError::permission(
                    ctx.path(&format!("messages/{message_id}")),
                    Operation::Write,
                ));
            }

            diesel::update(messages::table.find(message_id))
                .set(messages::read_confirmation.eq(true))
                .execute(conn)?;
            Ok(Message {
                read_confirmation: true,
                ..Message::from(row)
            })
        })
        .map_err(|err| self.observe(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicateDevicePolicy;
    use crate::documents::Student;
    use crate::enrollment::ConfirmEnrollment;
    use crate::enrollment::testing::{classroom, device_request};
    use crate::store::testing::temp_store;

    fn moderator() -> KeywordModerator {
        KeywordModerator::new(&ModerationConfig {
            blocked_terms: vec![" Idiot ".into()],
            max_length: 40,
        })
    }

    fn enrolled(store: &Store) -> (InstitutionContext, Student) {
        let scope = classroom(store, "Escuela 12");
        let pending = store
            .register_pending_enrollment(device_request(&scope, "AA:01"))
            .expect("pending");
        let ctx = InstitutionContext::new(&scope.institution_id);
        let student = store
            .confirm_enrollment(
                &ctx,
                ConfirmEnrollment {
                    enrollment_id: pending.id.clone(),
                    pending,
                    student_name: "Ana".into(),
                },
                DuplicateDevicePolicy::Replace,
            )
            .expect("confirm");
        (ctx, student)
    }

    #[test]
    fn keyword_moderator_flags_terms_and_length() {
        let moderator = moderator();
        assert_eq!(moderator.review("Bring your notebook"), ModerationVerdict::accept());
        assert!(!moderator.review("you IDIOT").is_valid);
        assert!(!moderator.review(&"a".repeat(41)).is_valid);
    }

    #[test]
    fn accepted_messages_are_stored_and_read() {
        let (store, _dir) = temp_store();
        let (ctx, student) = enrolled(&store);

        let sent = store
            .send_message(
                &ctx,
                "ms-rivera",
                NewMessage {
                    student_id: student.id.clone(),
                    body: " Bring your notebook ".into(),
                },
                &moderator(),
            )
            .expect("send");
        assert_eq!(sent.body, "Bring your notebook");
        assert!(!sent.read_confirmation);

        assert!(store.mark_message_read(&ctx, &sent.id).expect("read").read_confirmation);
        assert_eq!(store.messages_for(&ctx, &student.id).expect("list").len(), 1);
    }

    #[test]
    fn rejected_messages_persist_nothing() {
        let (store, _dir) = temp_store();
        let (ctx, student) = enrolled(&store);

        let err = store
            .send_message(
                &ctx,
                "ms-rivera",
                NewMessage {
                    student_id: student.id.clone(),
                    body: "you idiot".into(),
                },
                &moderator(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::ModerationRejected(_)));
        assert!(store.messages_for(&ctx, &student.id).expect("list").is_empty());
    }

    #[test]
    fn empty_messages_are_invalid() {
        let (store, _dir) = temp_store();
        let (ctx, student) = enrolled(&store);
        let err = store
            .send_message(
                &ctx,
                "ms-rivera",
                NewMessage {
                    student_id: student.id,
                    body: "  ".into(),
                },
                &moderator(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn unknown_message_cannot_be_marked_read() {
        let (store, _dir) = temp_store();
        let ctx = InstitutionContext::new("I1");
        assert!(matches!(
            store.mark_message_read(&ctx, "ghost"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn read_receipts_stay_within_the_institution() {
        let (store, _dir) = temp_store();
        let (ctx, student) = enrolled(&store);
        let sent = store
            .send_message(
                &ctx,
                "ms-rivera",
                NewMessage {
                    student_id: student.id.clone(),
                    body: "Bring your notebook".into(),
                },
                &moderator(),
            )
            .expect("send");

        let err = store
            .mark_message_read(&InstitutionContext::new("elsewhere"), &sent.id)
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
        assert!(!store.messages_for(&ctx, &student.id).expect("list")[0].read_confirmation);
    }
}
