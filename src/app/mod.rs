//! Headless presentation binding: user intents in, confirmed snapshots out.
//!
//! The view is always the latest snapshot pushed by the store. Intents write
//! to the store and never touch the view directly, so a failed write leaves
//! the previous state on screen.

mod notice;

use std::sync::Arc;

use tracing::warn;

pub use notice::Notice;

use crate::{
    auth::{AuthError, AuthState, IdentityProvider, Session, User},
    core::store::StoreError,
    op::BatchWrite,
    plan::{
        bulk::{plan_clear_all, plan_clear_completed, plan_complete_all},
        reorder::{plan_move, reorder_batch, MoveInstruction, Placement, ReorderError},
    },
    runtime::{
        handle::{RuntimeError, TodoStoreHandle},
        live::LiveQuery,
    },
    todo::{QueryFilter, TodoDraft, TodoPatch, TodoSnapshot},
    types::{TodoId, UserId},
};

/// Why an intent did not go through.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The intent needs a signed-in user.
    #[error("not signed in")]
    NotSignedIn,
    /// Sign-in failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The store refused or lost the write.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// The drop target does not exist in the current view.
    #[error(transparent)]
    Reorder(#[from] ReorderError),
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Runtime(RuntimeError::Store(value))
    }
}

/// Headless todo view bound to one store and one session.
pub struct TodoApp<P> {
    store: TodoStoreHandle,
    session: Session,
    provider: P,
    placement: Placement,
    view: Option<LiveQuery>,
    input: String,
    notices: Vec<Notice>,
    stale_reported: bool,
}

impl<P: IdentityProvider> TodoApp<P> {
    /// Builds the view. Nothing is subscribed until [`TodoApp::start`].
    pub fn new(store: TodoStoreHandle, session: Session, provider: P, placement: Placement) -> Self {
        Self {
            store,
            session,
            provider,
            placement,
            view: None,
            input: String::new(),
            notices: Vec::new(),
            stale_reported: false,
        }
    }

    /// Shared auth state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolves the startup auth state and opens the view if a session survived.
    pub async fn start(&mut self) -> Result<AuthState, AppError> {
        let state = self.session.restore(&self.provider).await;
        if state.user().is_some() {
            self.open_view().await?;
        }
        Ok(state)
    }

    /// Runs interactive sign-in, then opens the view for the new user.
    pub async fn sign_in(&mut self) -> Result<User, AppError> {
        match self.session.sign_in(&self.provider).await {
            Ok(user) => {
                self.open_view().await?;
                Ok(user)
            }
            Err(err) => {
                self.notices.push(Notice::SignInFailed(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Tears the live view down before the session goes away.
    pub async fn sign_out(&mut self) {
        self.close_view().await;
        self.session.sign_out(&self.provider).await;
    }

    /// Latest confirmed snapshot. Empty while signed out.
    pub fn todos(&self) -> Arc<TodoSnapshot> {
        match &self.view {
            Some(view) => view.current(),
            None => Arc::new(TodoSnapshot::default()),
        }
    }

    /// Waits for the next pushed snapshot. `None` when there is no live view.
    pub async fn next_snapshot(&mut self) -> Option<Arc<TodoSnapshot>> {
        let view = self.view.as_mut()?;
        let next = view.next().await;
        if next.is_none() {
            self.report_stale();
        }
        next
    }

    /// True when the view lost its live query and may show old data.
    pub fn is_stale(&mut self) -> bool {
        let stale = self.view.as_ref().is_some_and(|v| !v.is_live());
        if stale {
            self.report_stale();
        }
        stale
    }

    /// Current text of the new-item field.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replaces the new-item text.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Banners raised so far.
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Drains the raised banners.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Adds the input text as a new item. The input is cleared only once the
    /// store has acknowledged the write.
    pub async fn add(&mut self) -> Result<Option<TodoId>, AppError> {
        if self.input.trim().is_empty() {
            return Ok(None);
        }
        let author = self.require_user()?;
        let index = self.placement.rank_for_new(&self.todos().todos);
        let draft = TodoDraft::new(self.input.clone(), index, Some(author));

        match self.store.add(draft).await {
            Ok(id) => {
                self.input.clear();
                Ok(Some(id))
            }
            Err(err) => Err(self.write_failed("add item", err)),
        }
    }

    /// Flips the completed flag of one item as currently shown.
    pub async fn toggle(&mut self, id: TodoId) -> Result<(), AppError> {
        self.require_user()?;
        let completed = self
            .todos()
            .get(id)
            .map(|t| t.completed)
            .ok_or(StoreError::MissingTodo(id))?;
        self.write_one(id, TodoPatch::completed(!completed), "update item").await
    }

    /// Replaces the text of one item.
    pub async fn edit(&mut self, id: TodoId, content: impl Into<String>) -> Result<(), AppError> {
        self.require_user()?;
        self.write_one(id, TodoPatch::content(content), "edit item").await
    }

    /// Removes one item.
    pub async fn delete(&mut self, id: TodoId) -> Result<(), AppError> {
        self.require_user()?;
        if let Err(err) = self.store.delete(id).await {
            return Err(self.write_failed("delete item", err));
        }
        Ok(())
    }

    /// Marks every shown item completed in one batch.
    pub async fn complete_all(&mut self) -> Result<(), AppError> {
        let writes = plan_complete_all(&self.todos());
        self.commit_batch(writes, "complete all items").await
    }

    /// Deletes every shown item in one batch.
    pub async fn clear_all(&mut self) -> Result<(), AppError> {
        let writes = plan_clear_all(&self.todos());
        self.commit_batch(writes, "clear items").await
    }

    /// Deletes the shown completed items in one batch.
    pub async fn clear_completed(&mut self) -> Result<(), AppError> {
        let writes = plan_clear_completed(&self.todos());
        self.commit_batch(writes, "clear completed items").await
    }

    /// Applies a drag gesture. Returns false when the drop changed nothing.
    pub async fn move_item(&mut self, instruction: MoveInstruction) -> Result<bool, AppError> {
        let assignments = plan_move(&self.todos().todos, &instruction)?;
        if assignments.is_empty() {
            return Ok(false);
        }
        self.commit_batch(reorder_batch(&assignments), "reorder items").await?;
        Ok(true)
    }

    async fn open_view(&mut self) -> Result<(), AppError> {
        let state = self.session.known().await;
        let uid = state.user().map(|u| u.uid.clone()).ok_or(AppError::NotSignedIn)?;
        self.close_view().await;
        let view = self.store.subscribe(QueryFilter::by_author(uid)).await?;
        self.view = Some(view);
        self.stale_reported = false;
        Ok(())
    }

    async fn close_view(&mut self) {
        if let Some(view) = self.view.take() {
            if let Err(err) = view.close().await {
                warn!(error = %err, "live query close failed");
            }
        }
    }

    fn require_user(&self) -> Result<UserId, AppError> {
        self.session.uid().ok_or(AppError::NotSignedIn)
    }

    async fn write_one(&mut self, id: TodoId, patch: TodoPatch, action: &'static str) -> Result<(), AppError> {
        if let Err(err) = self.store.write_one(id, patch).await {
            return Err(self.write_failed(action, err));
        }
        Ok(())
    }

    async fn commit_batch(&mut self, writes: Vec<BatchWrite>, action: &'static str) -> Result<(), AppError> {
        self.require_user()?;
        if let Err(err) = self.store.write_batch(writes).await {
            return Err(self.write_failed(action, err));
        }
        Ok(())
    }

    fn write_failed(&mut self, action: &'static str, err: RuntimeError) -> AppError {
        warn!(action, error = %err, "write failed");
        self.notices.push(Notice::WriteFailed {
            action,
            message: err.to_string(),
        });
        err.into()
    }

    fn report_stale(&mut self) {
        if !self.stale_reported {
            self.stale_reported = true;
            warn!("live query ended; view is stale");
            self.notices.push(Notice::StaleData);
        }
    }
}
