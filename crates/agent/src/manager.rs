use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use parley_browser::ActionSurface;
use parley_core::config::AppConfig;
use parley_core::{
    ApprovalId, ConversationLog, EventSink, NegotiationBrief, Phase, SessionContext,
    SessionError, SessionId,
};

use crate::llm::DecisionClient;
use crate::research::ResearchProbe;
use crate::runtime::SessionRuntime;

/// Commands accepted by a session runtime. Delivered through the handle's
/// channel; the runtime processes them strictly in order with its other
/// event sources.
#[derive(Clone, Debug)]
pub enum SessionCommand {
    Start,
    Stop,
    Pause,
    Resume,
    Approve { request_id: ApprovalId },
    Reject { request_id: ApprovalId, directive: Option<String> },
    UserDirective { text: String },
    UserOverride { text: String },
    UserTyping,
    Research { query: String },
    SetDisplayName { name: String },
}

/// Cheap, cloneable reference to a live session: the command channel plus
/// read-only views of the state the runtime owns. This is also the
/// persistence surface; everything needed to reconstruct a saved record is
/// reachable from here.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    phase_rx: watch::Receiver<Phase>,
    shared_log: Arc<RwLock<ConversationLog>>,
    shared_context: Arc<RwLock<SessionContext>>,
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError::ChannelClosed)
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Resume).await
    }

    pub async fn approve(&self, request_id: ApprovalId) -> Result<(), SessionError> {
        self.send(SessionCommand::Approve { request_id }).await
    }

    pub async fn reject(
        &self,
        request_id: ApprovalId,
        directive: Option<String>,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Reject { request_id, directive }).await
    }

    pub async fn user_directive(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::UserDirective { text: text.into() }).await
    }

    pub async fn user_override(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::UserOverride { text: text.into() }).await
    }

    pub async fn user_typing_signal(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::UserTyping).await
    }

    pub async fn research(&self, query: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::Research { query: query.into() }).await
    }

    pub async fn set_display_name(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SetDisplayName { name: name.into() }).await
    }

    pub fn phase(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    /// Watch channel for phase changes, for callers that want to await a
    /// specific phase rather than poll.
    pub fn phase_watch(&self) -> watch::Receiver<Phase> {
        self.phase_rx.clone()
    }

    pub fn conversation(&self) -> ConversationLog {
        match self.shared_log.read() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn context(&self) -> SessionContext {
        match self.shared_context.read() {
            Ok(context) => context.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn brief(&self) -> NegotiationBrief {
        self.context().brief
    }
}

/// Owns every live session. Sessions are explicit objects with a
/// create/destroy lifecycle, addressed by id; there is no process-wide
/// notion of "the" active session.
pub struct SessionManager {
    config: AppConfig,
    client: Arc<dyn DecisionClient>,
    surface: Arc<dyn ActionSurface>,
    research_surface: Option<Arc<dyn ActionSurface>>,
    sink: Arc<dyn EventSink>,
    sessions: HashMap<SessionId, LiveSession>,
}

struct LiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl SessionManager {
    pub fn new(
        config: AppConfig,
        client: Arc<dyn DecisionClient>,
        surface: Arc<dyn ActionSurface>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { config, client, surface, research_surface: None, sessions: HashMap::new(), sink }
    }

    /// Configures a dedicated surface for research probes. Research never
    /// runs on the negotiation surface; navigating that away would destroy
    /// the chat.
    pub fn with_research_surface(mut self, surface: Arc<dyn ActionSurface>) -> Self {
        self.research_surface = Some(surface);
        self
    }

    /// Creates a fresh session for the given brief and chat URL. The session
    /// stays idle until its handle receives `start()`.
    pub fn create_session(
        &mut self,
        start_url: impl Into<String>,
        brief: NegotiationBrief,
    ) -> SessionHandle {
        let context = SessionContext::new(start_url, brief);
        self.spawn_session(context, ConversationLog::new())
    }

    /// Recreates a session from a previously saved context and conversation
    /// log. The resume-threshold policy knob decides whether the restored
    /// session skips its opening message.
    pub fn restore_session(
        &mut self,
        context: SessionContext,
        log: ConversationLog,
    ) -> SessionHandle {
        self.spawn_session(context, log)
    }

    fn spawn_session(&mut self, context: SessionContext, log: ConversationLog) -> SessionHandle {
        let session_id = context.session_id.clone();
        let research = self.research_surface.as_ref().map(|surface| {
            ResearchProbe::new(Arc::clone(surface))
        });

        let (runtime, parts) = SessionRuntime::new(
            context,
            log,
            self.config.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.surface),
            research,
            Arc::clone(&self.sink),
        );

        let (command_tx, command_rx) = mpsc::channel(32);
        let task = tokio::spawn(runtime.run(
            command_rx,
            parts.observer_events,
            parts.turns,
            parts.stall_notices,
        ));

        let handle = SessionHandle {
            commands: command_tx,
            phase_rx: parts.phase_rx,
            shared_log: parts.shared_log,
            shared_context: parts.shared_context,
        };

        info!(session_id = %session_id, "session created");
        self.sessions.insert(session_id, LiveSession { handle: handle.clone(), task });
        handle
    }

    pub fn session(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|live| live.handle.clone())
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Stops the session and waits for its runtime task to finish. Teardown
    /// problems are swallowed; destroy always removes the session.
    pub async fn destroy_session(&mut self, session_id: &SessionId) {
        let Some(live) = self.sessions.remove(session_id) else {
            return;
        };
        let _ = live.handle.stop().await;
        let _ = live.task.await;
        info!(session_id = %session_id, "session destroyed");
    }

    /// Stops every session; used on application shutdown.
    pub async fn shutdown(&mut self) {
        let ids = self.session_ids();
        for session_id in ids {
            self.destroy_session(&session_id).await;
        }
    }
}
