//! The `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::ids::{RoleId, ThreadId, UserId};
use crate::onboarding::model::{Language, ThreadRecord};

/// Backend-agnostic record store covering the language catalog and scratch
/// thread bookkeeping.
///
/// The workflow treats these as blocking calls; implementations may suspend
/// the calling task but must be safe for concurrent use.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Language catalog ────────────────────────────────────────────

    /// All registered languages, in registration order.
    async fn get_languages(&self) -> Result<Vec<Language>, DatabaseError>;

    /// Register a language. Fails on a duplicate role id.
    async fn add_language(&self, language: &Language) -> Result<(), DatabaseError>;

    /// Remove a language by role id. Removing an unknown id is a no-op.
    async fn remove_language(&self, role_id: RoleId) -> Result<(), DatabaseError>;

    /// Look up a single language by role id.
    async fn language_exists(&self, role_id: RoleId) -> Result<Option<Language>, DatabaseError>;

    // ── Thread bookkeeping ──────────────────────────────────────────

    /// Record a newly opened scratch thread so it can be reclaimed if the
    /// process dies or the applicant leaves.
    async fn record_thread(
        &self,
        thread_id: ThreadId,
        applicant_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Fetch a thread record, if one exists.
    async fn get_thread(&self, thread_id: ThreadId) -> Result<Option<ThreadRecord>, DatabaseError>;

    /// Delete a thread record. Idempotent: forgetting an unknown thread is
    /// a no-op, because resolution and abort paths may both clean up.
    async fn forget_thread(&self, thread_id: ThreadId) -> Result<(), DatabaseError>;
}
