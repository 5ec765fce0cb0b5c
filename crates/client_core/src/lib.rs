use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{LeadId, LeadStatus},
    protocol::{Credentials, LeadRecord, NewLead},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod cache;
pub mod rest;

pub use cache::LeadCache;

/// Returned when a read or write is attempted after the session gate
/// denied access or after logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no active session")]
pub struct NotAuthorized;

const NAME_REQUIRED_MESSAGE: &str = "name is required";
const SESSION_INCONSISTENT_MESSAGE: &str =
    "sign-in succeeded but no active session was found; please try again";

/// Authentication collaborator. The console only ever observes session
/// presence and ends sessions; token internals stay opaque.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_present(&self) -> Result<bool>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<()>;
    async fn sign_out(&self) -> Result<()>;
}

/// Remote lead table collaborator. `list_leads` returns the full set
/// visible to the current session, newest first; the store assigns id,
/// creation time, initial status, and ownership on insert.
#[async_trait]
pub trait LeadDataService: Send + Sync {
    async fn list_leads(&self) -> Result<Vec<LeadRecord>>;
    async fn insert_lead(&self, lead: &NewLead) -> Result<()>;
    async fn update_status(&self, id: LeadId, status: LeadStatus) -> Result<()>;
    async fn delete_lead(&self, id: LeadId) -> Result<()>;
}

/// Destructive-action guard consulted before any remote delete is issued.
#[async_trait]
pub trait DeleteConfirmer: Send + Sync {
    async fn confirm_delete(&self, lead: &LeadRecord) -> bool;
}

pub struct MissingSessionProvider;

#[async_trait]
impl SessionProvider for MissingSessionProvider {
    async fn session_present(&self) -> Result<bool> {
        Err(anyhow!("auth backend unavailable"))
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<()> {
        Err(anyhow!("auth backend unavailable"))
    }

    async fn sign_out(&self) -> Result<()> {
        Err(anyhow!("auth backend unavailable"))
    }
}

pub struct MissingLeadDataService;

#[async_trait]
impl LeadDataService for MissingLeadDataService {
    async fn list_leads(&self) -> Result<Vec<LeadRecord>> {
        Err(anyhow!("lead data backend unavailable"))
    }

    async fn insert_lead(&self, _lead: &NewLead) -> Result<()> {
        Err(anyhow!("lead data backend unavailable"))
    }

    async fn update_status(&self, _id: LeadId, _status: LeadStatus) -> Result<()> {
        Err(anyhow!("lead data backend unavailable"))
    }

    async fn delete_lead(&self, _id: LeadId) -> Result<()> {
        Err(anyhow!("lead data backend unavailable"))
    }
}

pub struct AlwaysConfirm;

#[async_trait]
impl DeleteConfirmer for AlwaysConfirm {
    async fn confirm_delete(&self, _lead: &LeadRecord) -> bool {
        true
    }
}

/// Outcome of the session gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    RedirectToLogin,
}

/// Entry route for a caller landing on the application root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Management,
    Login,
}

/// Outcome of a sign-in attempt that the collaborator reported as
/// successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignIn {
    Established,
    /// The collaborator reported success but a follow-up presence check
    /// found no session; the caller should retry.
    SessionMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Failure,
}

/// The single user-visible message slot. Each new attempt overwrites it;
/// only the most recent outcome is ever shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    LeadsLoaded { count: usize },
    LeadCreated { name: String },
    StatusChanged { id: LeadId, status: LeadStatus },
    LeadDeleted { id: LeadId },
    SignedOut,
    Notice(Notice),
}

/// Creation form state as the user typed it. Held by the console so a
/// failed create preserves every field for retry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadDraft {
    pub name: String,
    pub contact_handle: String,
    pub category: String,
    pub note: String,
}

impl LeadDraft {
    /// Trims every field and normalizes empty optionals away. Returns None
    /// when the required name is empty after trimming.
    fn normalized(&self) -> Option<NewLead> {
        let name = self.name.trim();
        if name.is_empty() {
            return None;
        }
        Some(NewLead {
            name: name.to_string(),
            contact_handle: none_if_empty(&self.contact_handle),
            category: none_if_empty(&self.category),
            note: none_if_empty(&self.note),
        })
    }
}

fn none_if_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

struct ConsoleState {
    authorized: bool,
    leads: LeadCache,
    draft: LeadDraft,
    last_message: Option<Notice>,
}

/// Session-gated coordinator over the lead cache: every remote write goes
/// out first, and the matching local mutation is applied only after the
/// collaborator confirmed it.
pub struct LeadConsole {
    session: Arc<dyn SessionProvider>,
    data: Arc<dyn LeadDataService>,
    confirmer: Arc<dyn DeleteConfirmer>,
    inner: Mutex<ConsoleState>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl LeadConsole {
    pub fn new(
        session: Arc<dyn SessionProvider>,
        data: Arc<dyn LeadDataService>,
        confirmer: Arc<dyn DeleteConfirmer>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            session,
            data,
            confirmer,
            inner: Mutex::new(ConsoleState {
                authorized: false,
                leads: LeadCache::default(),
                draft: LeadDraft::default(),
                last_message: None,
            }),
            events,
        })
    }

    pub fn with_missing_collaborators() -> Arc<Self> {
        Self::new(
            Arc::new(MissingSessionProvider),
            Arc::new(MissingLeadDataService),
            Arc::new(AlwaysConfirm),
        )
    }

    /// Maps session presence to the entry route for a caller landing on
    /// the application root.
    pub async fn landing_route(&self) -> Result<Route> {
        Ok(if self.session.session_present().await? {
            Route::Management
        } else {
            Route::Login
        })
    }

    /// Re-entrant session gate. Absence of a session is a normal state
    /// handled by redirect, not an error.
    pub async fn check_access(&self) -> Result<Access> {
        let present = self.session.session_present().await?;
        let mut guard = self.inner.lock().await;
        guard.authorized = present;
        Ok(if present {
            Access::Granted
        } else {
            Access::RedirectToLogin
        })
    }

    /// Gate plus initial load. When the gate denies, no data-service call
    /// is issued. A failed initial load still grants access: the previous
    /// cache stays intact, the failure lands in the message slot, and the
    /// caller may retry via `reload`.
    pub async fn open(&self) -> Result<Access> {
        if self.check_access().await? == Access::RedirectToLogin {
            info!("no active session; redirecting to login");
            return Ok(Access::RedirectToLogin);
        }
        if let Err(err) = self.refresh_leads().await {
            warn!("initial lead load failed: {err}");
        }
        Ok(Access::Granted)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<SignIn> {
        self.clear_message().await;
        if let Err(err) = self.session.sign_in(credentials).await {
            self.record_failure(&err).await;
            return Err(err);
        }
        if !self.session.session_present().await? {
            warn!("sign-in reported success but no session is present");
            self.record_notice(NoticeKind::Info, SESSION_INCONSISTENT_MESSAGE)
                .await;
            return Ok(SignIn::SessionMissing);
        }
        Ok(SignIn::Established)
    }

    /// Ends the session. The local session is discarded even when the
    /// remote sign-out call fails.
    pub async fn logout(&self) {
        let sign_out = self.session.sign_out().await;
        {
            let mut guard = self.inner.lock().await;
            guard.authorized = false;
            guard.leads.clear();
            guard.draft = LeadDraft::default();
            guard.last_message = None;
        }
        if let Err(err) = sign_out {
            warn!("remote sign-out failed: {err}");
        }
        let _ = self.events.send(ConsoleEvent::SignedOut);
    }

    /// Manual full refresh from the remote store. On failure the previous
    /// cache stays intact and the error message is surfaced verbatim.
    pub async fn reload(&self) -> Result<()> {
        self.ensure_authorized().await?;
        self.clear_message().await;
        self.refresh_leads().await
    }

    /// Creates a lead from the current draft. An empty name is rejected
    /// locally and never reaches the data service. After a confirmed
    /// create the draft is cleared and the list reloaded so server-assigned
    /// fields and authoritative ordering are reflected.
    pub async fn create_lead(&self) -> Result<()> {
        self.ensure_authorized().await?;
        self.clear_message().await;
        let draft = { self.inner.lock().await.draft.clone() };
        let Some(new_lead) = draft.normalized() else {
            self.record_notice(NoticeKind::Failure, NAME_REQUIRED_MESSAGE)
                .await;
            return Err(anyhow!(NAME_REQUIRED_MESSAGE));
        };
        if let Err(err) = self.data.insert_lead(&new_lead).await {
            self.record_failure(&err).await;
            return Err(err);
        }
        {
            self.inner.lock().await.draft = LeadDraft::default();
        }
        info!(name = %new_lead.name, "lead created");
        let _ = self.events.send(ConsoleEvent::LeadCreated {
            name: new_lead.name,
        });
        self.refresh_leads().await
    }

    /// Persists a status change, then patches the one record in place.
    /// No reload: the cache mutation is O(1) against the list.
    pub async fn update_status(&self, id: LeadId, status: LeadStatus) -> Result<()> {
        self.ensure_authorized().await?;
        self.clear_message().await;
        if let Err(err) = self.data.update_status(id, status).await {
            self.record_failure(&err).await;
            return Err(err);
        }
        let patched = { self.inner.lock().await.leads.apply_status_patch(id, status) };
        if !patched {
            // The row vanished locally between render and confirm; the next
            // reload reconciles.
            warn!(lead_id = %id.0, "status persisted for a lead no longer in the cache");
        }
        let _ = self.events.send(ConsoleEvent::StatusChanged { id, status });
        Ok(())
    }

    /// Deletes a lead after the destructive-action guard confirms. A
    /// declined confirmation issues no remote call and leaves everything
    /// untouched.
    pub async fn delete_lead(&self, id: LeadId) -> Result<DeleteOutcome> {
        self.ensure_authorized().await?;
        let Some(lead) = ({ self.inner.lock().await.leads.get(id).cloned() }) else {
            return Err(anyhow!("no lead {} in the current list", id.0));
        };
        if !self.confirmer.confirm_delete(&lead).await {
            return Ok(DeleteOutcome::Declined);
        }
        self.clear_message().await;
        if let Err(err) = self.data.delete_lead(id).await {
            self.record_failure(&err).await;
            return Err(err);
        }
        {
            self.inner.lock().await.leads.apply_removal(id);
        }
        let _ = self.events.send(ConsoleEvent::LeadDeleted { id });
        Ok(DeleteOutcome::Deleted)
    }

    pub async fn set_draft(&self, draft: LeadDraft) {
        self.inner.lock().await.draft = draft;
    }

    pub async fn draft(&self) -> LeadDraft {
        self.inner.lock().await.draft.clone()
    }

    pub async fn leads(&self) -> Vec<LeadRecord> {
        self.inner.lock().await.leads.snapshot()
    }

    pub async fn last_message(&self) -> Option<Notice> {
        self.inner.lock().await.last_message.clone()
    }

    pub async fn is_authorized(&self) -> bool {
        self.inner.lock().await.authorized
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    async fn ensure_authorized(&self) -> Result<()> {
        if self.inner.lock().await.authorized {
            Ok(())
        } else {
            Err(NotAuthorized.into())
        }
    }

    async fn refresh_leads(&self) -> Result<()> {
        match self.data.list_leads().await {
            Ok(leads) => {
                let count = leads.len();
                {
                    let mut guard = self.inner.lock().await;
                    guard.leads.replace_all(leads);
                    guard.last_message = None;
                }
                let _ = self.events.send(ConsoleEvent::LeadsLoaded { count });
                Ok(())
            }
            Err(err) => {
                self.record_failure(&err).await;
                Err(err)
            }
        }
    }

    async fn clear_message(&self) {
        self.inner.lock().await.last_message = None;
    }

    async fn record_notice(&self, kind: NoticeKind, text: impl Into<String>) {
        let notice = Notice {
            kind,
            text: text.into(),
        };
        {
            self.inner.lock().await.last_message = Some(notice.clone());
        }
        let _ = self.events.send(ConsoleEvent::Notice(notice));
    }

    async fn record_failure(&self, err: &anyhow::Error) {
        self.record_notice(NoticeKind::Failure, err.to_string()).await;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
