//! In-memory upload wizard sessions
//!
//! Each session owns one [`WizardState`], the attached file bytes, a
//! debouncer for manual slot checks and a cancellation token for in-flight
//! uploads. The session map lock is only held while a transition is
//! applied, never across store or blob store I/O.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use ngo_common::config::WizardConfig;
use ngo_common::events::{EventBus, MediaEvent};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::blob_store::UploadFile;
use super::occupancy_checker::CheckDebouncer;
use super::replacement::UploadContext;
use super::upload_orchestrator::UploadOrchestrator;
use crate::error::{MediaError, MediaResult};
use crate::models::{PageCatalog, SlotAddress};
use crate::wizard::{
    abandoned_result_cleanup, step_indicators, transition, Effect, StepIndicator, Transition,
    WizardInput, WizardState,
};

struct WizardSession {
    id: Uuid,
    state: WizardState,
    file: Option<Arc<UploadFile>>,
    debouncer: CheckDebouncer,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl WizardSession {
    fn new(debounce: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: WizardState::new(),
            file: None,
            debouncer: CheckDebouncer::new(debounce),
            cancel: CancellationToken::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Uploaded candidate nobody will confirm once the session is gone
    ///
    /// While a replace is in flight the candidate belongs to it; the
    /// orphaned result releases it instead.
    fn abandoned_candidate(&self) -> Option<String> {
        if self.state.committing {
            return None;
        }
        self.state
            .pending
            .as_ref()
            .and_then(|p| p.candidate.uploaded_url())
            .map(str::to_string)
    }
}

/// Snapshot of a wizard for rendering
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub wizard_id: Uuid,
    pub state: WizardState,
    pub steps: Vec<StepIndicator>,
    pub file_attached: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl WizardView {
    fn of(session: &WizardSession, catalog: &PageCatalog) -> Self {
        Self {
            wizard_id: session.id,
            state: session.state.clone(),
            steps: step_indicators(&session.state, catalog),
            file_attached: session.file.is_some(),
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}

#[derive(Clone)]
pub struct WizardRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, WizardSession>>>,
    orchestrator: Arc<UploadOrchestrator>,
    event_bus: EventBus,
    debounce: Duration,
    idle_timeout: Duration,
}

impl WizardRegistry {
    pub fn new(
        orchestrator: Arc<UploadOrchestrator>,
        event_bus: EventBus,
        config: &WizardConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            orchestrator,
            event_bus,
            debounce: Duration::from_millis(config.check_debounce_ms),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    pub async fn start(&self) -> WizardView {
        let session = WizardSession::new(self.debounce);
        let view = WizardView::of(&session, self.orchestrator.catalog());
        info!(wizard_id = %session.id, "Upload wizard started");
        self.sessions.write().await.insert(session.id, session);
        view
    }

    pub async fn view(&self, id: Uuid) -> MediaResult<WizardView> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .map(|s| WizardView::of(s, self.orchestrator.catalog()))
            .ok_or(MediaError::WizardNotFound(id))
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Apply a user input and run the effects it requested
    ///
    /// Returns once all non-debounced effects have completed, so a commit
    /// call observes its own outcome.
    pub async fn apply(&self, id: Uuid, input: WizardInput) -> MediaResult<WizardView> {
        let effects = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&id)
                .ok_or(MediaError::WizardNotFound(id))?;
            session.last_activity = Utc::now();

            if matches!(input, WizardInput::Cancel) {
                session.cancel.cancel();
                session.cancel = CancellationToken::new();
            }

            let action = input.action();
            match transition(&session.state, input, self.orchestrator.catalog()) {
                Ok(t) => self.commit_transition(session, t),
                Err(e) => {
                    debug!(wizard_id = %id, action, error = %e, "Wizard input rejected");
                    session.state.last_error = Some(e.to_string());
                    return Err(e);
                }
            }
        };

        self.drive(id, effects).await;
        self.view(id).await
    }

    /// Gate the file, then attach it to the wizard
    pub async fn attach_file(&self, id: Uuid, file: UploadFile) -> MediaResult<WizardView> {
        let meta = file.meta();
        let effects = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&id)
                .ok_or(MediaError::WizardNotFound(id))?;
            session.last_activity = Utc::now();

            let attempt = self
                .orchestrator
                .policy()
                .check(&meta)
                .and_then(|()| {
                    transition(
                        &session.state,
                        WizardInput::AttachFile(meta.clone()),
                        self.orchestrator.catalog(),
                    )
                });
            let t = match attempt {
                Ok(t) => t,
                Err(e) => {
                    session.state.last_error = Some(e.to_string());
                    return Err(e);
                }
            };

            let effects = self.commit_transition(session, t);
            session.file = Some(Arc::new(file));
            debug!(
                wizard_id = %id,
                file_name = %meta.file_name,
                size_bytes = meta.size_bytes,
                "File attached"
            );
            effects
        };

        self.drive(id, effects).await;
        self.view(id).await
    }

    /// Drop a wizard entirely, aborting any upload it has in flight
    pub async fn close(&self, id: Uuid) -> MediaResult<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(MediaError::WizardNotFound(id))?;

        session.cancel.cancel();
        if let Some(asset_url) = session.abandoned_candidate() {
            self.orchestrator.discard_asset(&asset_url).await;
        }
        info!(wizard_id = %id, "Upload wizard closed");
        Ok(())
    }

    /// Remove wizards idle for longer than the configured timeout
    pub async fn purge_idle(&self) -> usize {
        let cutoff = match chrono::Duration::from_std(self.idle_timeout) {
            Ok(timeout) => Utc::now() - timeout,
            Err(_) => return 0,
        };

        let expired: Vec<WizardSession> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|s| s.last_activity < cutoff)
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.cancel.cancel();
            if let Some(asset_url) = session.abandoned_candidate() {
                self.orchestrator.discard_asset(&asset_url).await;
            }
            info!(
                wizard_id = %session.id,
                step = %session.state.step,
                "Idle upload wizard expired"
            );
        }
        expired.len()
    }

    /// Periodically purge idle wizards until `shutdown` fires
    pub fn spawn_idle_sweeper(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        let period = (self.idle_timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Idle wizard sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = registry.purge_idle().await;
                        if purged > 0 {
                            debug!(purged, "Idle wizard sweep finished");
                        }
                    }
                }
            }
        })
    }

    fn commit_transition(&self, session: &mut WizardSession, t: Transition) -> Vec<Effect> {
        let Transition {
            state,
            effects,
            step_change,
        } = t;

        if let Some(change) = step_change {
            info!(
                wizard_id = %session.id,
                from = %change.from,
                to = %change.to,
                "Wizard step changed"
            );
            self.event_bus.emit_lossy(MediaEvent::WizardStepChanged {
                wizard_id: session.id,
                old_step: change.from.as_str().to_string(),
                new_step: change.to.as_str().to_string(),
                timestamp: Utc::now(),
            });
        }

        session.state = state;
        if session.state.file.is_none() {
            session.file = None;
        }
        effects
    }

    /// Run effects, feeding each result back into the wizard
    fn drive(&self, id: Uuid, effects: Vec<Effect>) -> BoxFuture<'_, ()> {
        async move {
            let mut queue: VecDeque<Effect> = effects.into();

            while let Some(effect) = queue.pop_front() {
                match effect {
                    Effect::CheckOccupancy {
                        slot,
                        debounce: true,
                    } => self.schedule_check(id, slot).await,
                    Effect::DiscardUploadedAsset { asset_url } => {
                        self.orchestrator.discard_asset(&asset_url).await;
                    }
                    effect => {
                        let Some((file, ctx)) =
                            self.effect_context(id, effect.commit_attempt()).await
                        else {
                            // Closed before the replace started
                            if let Effect::Replace { pending, .. } = &effect {
                                if let Some(asset_url) = pending.candidate.uploaded_url() {
                                    self.orchestrator.discard_asset(asset_url).await;
                                }
                            }
                            return;
                        };
                        if let Some(input) = self.orchestrator.run_effect(effect, file, &ctx).await
                        {
                            queue.extend(self.feed(id, input).await);
                        }
                    }
                }
            }
        }
        .boxed()
    }

    /// File and upload context for an effect about to run
    ///
    /// A commit or replace whose attempt was abandoned before it started
    /// gets an already-cancelled token, so it writes nothing.
    async fn effect_context(
        &self,
        id: Uuid,
        attempt: Option<u64>,
    ) -> Option<(Option<Arc<UploadFile>>, UploadContext)> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id)?;

        let abandoned = attempt.is_some_and(|attempt| {
            !session.state.committing || session.state.commit_attempt != attempt
        });
        let cancel = if abandoned {
            let token = CancellationToken::new();
            token.cancel();
            token
        } else {
            session.cancel.clone()
        };
        Some((session.file.clone(), UploadContext::for_wizard(id, cancel)))
    }

    /// Apply an effect result; a wizard that disappeared meanwhile still
    /// gets its cleanup effects
    async fn feed(&self, id: Uuid, input: WizardInput) -> Vec<Effect> {
        let catalog = self.orchestrator.catalog();
        let mut sessions = self.sessions.write().await;

        let Some(session) = sessions.get_mut(&id) else {
            return abandoned_result_cleanup(&input);
        };

        let action = input.action();
        match transition(&session.state, input, catalog) {
            Ok(t) => self.commit_transition(session, t),
            Err(e) => {
                warn!(wizard_id = %id, action, error = %e, "Effect result rejected");
                session.state.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    /// Latest-wins delayed occupancy check for typed slot numbers
    async fn schedule_check(&self, id: Uuid, slot: SlotAddress) {
        let debouncer = {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(session) => session.debouncer.clone(),
                None => return,
            }
        };
        let ticket = debouncer.ticket();
        let registry = self.clone();

        tokio::spawn(async move {
            if !debouncer.settle(ticket).await {
                trace!(wizard_id = %id, slot = %slot, "Superseded slot check dropped");
                return;
            }
            registry
                .drive(
                    id,
                    vec![Effect::CheckOccupancy {
                        slot,
                        debounce: false,
                    }],
                )
                .await;
        });
    }
}
