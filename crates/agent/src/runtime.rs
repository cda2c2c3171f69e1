use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use parley_browser::{
    suggests_remote_composing, ActionSurface, ChatSender, ComposerChatSender, ObserverEvent,
    SnapshotObserver,
};
use parley_core::config::AppConfig;
use parley_core::{
    ApprovalId, ApprovalRequest, ApprovalResolution, ConversationLog, EventSink, FailureClass,
    NegotiationBrief, Phase, PhaseEvent, PhaseTransition, PhaseEngine, Sender, SessionContext,
    SessionError, SessionId, UiEvent, UiEventKind,
};

use crate::decisions::{
    parse_decision, ContactDecision, DecisionAction, ExtractionDecision, NegotiationDecision,
    ReportedMessage,
};
use crate::llm::{DecisionClient, StructuredResponse};
use crate::manager::SessionCommand;
use crate::prompts;
use crate::rendezvous::ApprovalGate;
use crate::research::ResearchProbe;
use crate::stall::StallScheduler;
use crate::timers::{TimerPurpose, TimerTable};

/// What kind of decision turn is in flight. Dispatch is phase-dependent:
/// reaching-human and negotiating turns use distinct structured contracts,
/// extraction turns only harvest new messages, and resolution turns generate
/// the closing message after the human decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TurnKind {
    Contact,
    Negotiate { nudge: bool },
    Extract,
    Resolution { approved: bool, directive: Option<String> },
}

#[derive(Debug)]
pub(crate) enum TurnPayload {
    Structured(StructuredResponse),
    Freeform(String),
}

#[derive(Debug)]
pub(crate) struct TurnMessage {
    kind: TurnKind,
    result: Result<TurnPayload, crate::llm::DecisionError>,
}

struct PendingApproval {
    request: ApprovalRequest,
    gate: ApprovalGate,
}

/// Receiver ends and shared read views created alongside a runtime; the
/// session manager wires them into the spawned task and the handle.
pub(crate) struct RuntimeParts {
    pub observer_events: mpsc::Receiver<ObserverEvent>,
    pub turns: mpsc::Receiver<TurnMessage>,
    pub stall_notices: mpsc::Receiver<String>,
    pub phase_rx: watch::Receiver<Phase>,
    pub shared_log: Arc<RwLock<ConversationLog>>,
    pub shared_context: Arc<RwLock<SessionContext>>,
}

/// The negotiation core: one task owning the conversation log and phase,
/// fed by observer change events, human commands, turn completions, and the
/// timer table. Everything else only sends events toward it.
pub(crate) struct SessionRuntime {
    session_id: SessionId,
    context: Arc<RwLock<SessionContext>>,
    config: AppConfig,
    engine: PhaseEngine,
    phase: Phase,
    phase_tx: watch::Sender<Phase>,
    log: ConversationLog,
    shared_log: Arc<RwLock<ConversationLog>>,
    sink: Arc<dyn EventSink>,
    client: Arc<dyn DecisionClient>,
    surface: Arc<dyn ActionSurface>,
    chat: Arc<ComposerChatSender>,
    observer: SnapshotObserver,
    observer_tx: mpsc::Sender<ObserverEvent>,
    stall: StallScheduler,
    timers: TimerTable,
    turn_tx: mpsc::Sender<TurnMessage>,
    turn_in_flight: bool,
    pending: Option<PendingApproval>,
    /// A resolution turn that arrived while another decision call was in
    /// flight. Triggers are dropped under the single-flight guard, but the
    /// closing message after a human decision must never be lost.
    deferred_resolution: Option<TurnKind>,
    resume_phase: Option<Phase>,
    last_snapshot: String,
    skip_opening_message: bool,
    research: Option<ResearchProbe>,
}

impl SessionRuntime {
    pub(crate) fn new(
        context: SessionContext,
        initial_log: ConversationLog,
        config: AppConfig,
        client: Arc<dyn DecisionClient>,
        surface: Arc<dyn ActionSurface>,
        research: Option<ResearchProbe>,
        sink: Arc<dyn EventSink>,
    ) -> (Self, RuntimeParts) {
        let (observer_tx, observer_events) = mpsc::channel(32);
        let (turn_tx, turns) = mpsc::channel(8);
        let (stall_tx, stall_notices) = mpsc::channel(8);
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);

        let session_id = context.session_id.clone();
        let shared_log = Arc::new(RwLock::new(initial_log.clone()));
        let shared_context = Arc::new(RwLock::new(context));

        let chat = Arc::new(ComposerChatSender::new(Arc::clone(&surface)));
        let observer = SnapshotObserver::new(Arc::clone(&surface), config.timing.poll_interval());
        let stall = StallScheduler::new(
            Arc::clone(&chat) as Arc<dyn ChatSender>,
            config.stall.clone(),
            stall_tx,
        );

        let runtime = Self {
            session_id,
            context: Arc::clone(&shared_context),
            config,
            engine: PhaseEngine,
            phase: Phase::Idle,
            phase_tx,
            log: initial_log,
            shared_log: Arc::clone(&shared_log),
            sink,
            client,
            surface,
            chat,
            observer,
            observer_tx,
            stall,
            timers: TimerTable::new(),
            turn_tx,
            turn_in_flight: false,
            pending: None,
            deferred_resolution: None,
            resume_phase: None,
            last_snapshot: String::new(),
            skip_opening_message: false,
            research,
        };

        let parts = RuntimeParts {
            observer_events,
            turns,
            stall_notices,
            phase_rx,
            shared_log,
            shared_context,
        };

        (runtime, parts)
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut observer_events: mpsc::Receiver<ObserverEvent>,
        mut turns: mpsc::Receiver<TurnMessage>,
        mut stall_notices: mpsc::Receiver<String>,
    ) {
        info!(session_id = %self.session_id, "session runtime started");

        while !self.phase.is_terminal() {
            let next_timer = self.timers.next_due();

            tokio::select! {
                maybe_command = commands.recv() => match maybe_command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle dropped: treat as an implicit stop so the
                    // task cannot outlive its session.
                    None => self.handle_stop().await,
                },
                Some(event) = observer_events.recv() => self.on_observer_event(event),
                Some(message) = turns.recv() => self.on_turn_completed(message).await,
                Some(text) = stall_notices.recv() => self.on_stall_sent(text),
                purpose = wait_for_timer(next_timer), if next_timer.is_some() => {
                    self.on_timer_fired(purpose).await;
                }
            }
        }

        info!(session_id = %self.session_id, "session runtime finished");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.handle_start().await,
            SessionCommand::Stop => self.handle_stop().await,
            SessionCommand::Pause => self.handle_pause(),
            SessionCommand::Resume => self.handle_resume().await,
            SessionCommand::Approve { request_id } => {
                self.handle_approval_command(request_id, ApprovalResolution::Approved).await;
            }
            SessionCommand::Reject { request_id, directive } => {
                self.handle_approval_command(
                    request_id,
                    ApprovalResolution::Rejected { directive },
                )
                .await;
            }
            SessionCommand::UserDirective { text } => self.handle_user_directive(text).await,
            SessionCommand::UserOverride { text } => self.handle_user_override(text).await,
            SessionCommand::UserTyping => self.handle_user_typing(),
            SessionCommand::Research { query } => self.handle_research(query).await,
            SessionCommand::SetDisplayName { name } => self.set_display_name(name),
        }
    }

    async fn handle_start(&mut self) {
        if self.apply_phase_event(PhaseEvent::StartRequested).is_none() {
            return;
        }

        let url = self.context_snapshot().start_url;
        if let Err(error) = self.surface.navigate(&url).await {
            // Not fatal: the observer and watchdog keep probing, so the
            // session still converges if the page comes up late.
            warn!(error = %error, url = %url, "initial navigation failed");
            self.publish_error(FailureClass::TransientCapability, &error.to_string());
        }

        tokio::time::sleep(Duration::from_secs(self.config.surface.navigation_settle_secs)).await;

        self.skip_opening_message =
            self.log.remote_message_count() >= self.brief().resume_threshold;
        if self.skip_opening_message {
            debug!("prior remote messages found; treating session as mid-conversation");
        }

        if self.apply_phase_event(PhaseEvent::ConnectionEstablished).is_some() {
            self.observer.start(self.observer_tx.clone());
            self.arm_watchdog();
        }
    }

    async fn handle_stop(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        if self.apply_phase_event(PhaseEvent::StopRequested).is_none() {
            return;
        }

        self.timers.clear_all();
        self.observer.stop();
        self.stall.stop();

        if let Some(mut pending) = self.pending.take() {
            pending.gate.cancel();
            debug!(request_id = ?pending.request.id, "pending approval force-resolved as rejected");
        }

        // Best-effort closing summary; teardown errors never block the stop.
        if !self.log.is_empty() {
            let tail = prompts::conversation_tail(&self.log, &self.last_snapshot);
            match self.client.decide(&prompts::summary_prompt(), &tail).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    self.append_message(
                        Sender::System,
                        format!("Session summary: {}", summary.trim()),
                    );
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(
                        error = %error,
                        class = FailureClass::Teardown.as_str(),
                        "closing summary failed; ignored"
                    );
                }
            }
        }
    }

    fn handle_pause(&mut self) {
        let prior = self.phase;
        if self.apply_phase_event(PhaseEvent::PauseRequested).is_none() {
            return;
        }

        // Pause freezes the phase and silences every timer. The observer
        // keeps polling (its change events are ignored while paused, which
        // preserves its fingerprint state); the conversation log, a pending
        // approval, and the running stall scheduler are left untouched.
        self.timers.clear_all();
        self.resume_phase = Some(prior);
    }

    async fn handle_resume(&mut self) {
        let Some(prior) = self.resume_phase else {
            self.publish_rejection(
                SessionError::CommandUnavailable { command: "resume", phase: self.phase }
                    .to_string(),
            );
            return;
        };
        if self.apply_phase_event(PhaseEvent::ResumeRequested { prior }).is_none() {
            return;
        }
        self.resume_phase = None;

        // One fresh turn on a fresh snapshot so the decision capability
        // catches up on whatever happened while paused.
        self.arm_watchdog();
        self.force_fresh_turn().await;
    }

    async fn handle_approval_command(
        &mut self,
        request_id: ApprovalId,
        resolution: ApprovalResolution,
    ) {
        if self.phase != Phase::AwaitingApproval {
            self.publish_rejection(
                SessionError::CommandUnavailable { command: "approve/reject", phase: self.phase }
                    .to_string(),
            );
            return;
        }

        let Some(mut pending) = self.pending.take() else {
            self.publish_rejection(
                SessionError::UnknownApprovalRequest(request_id).to_string(),
            );
            return;
        };
        if pending.request.id != request_id {
            self.pending = Some(pending);
            self.publish_rejection(
                SessionError::UnknownApprovalRequest(request_id).to_string(),
            );
            return;
        }

        pending.gate.resolve(resolution);
        let resolution = pending.gate.wait().await;
        let approved = resolution.is_approved();
        let directive = match resolution {
            ApprovalResolution::Rejected { directive } => directive,
            ApprovalResolution::Approved => None,
        };

        if self.apply_phase_event(PhaseEvent::ApprovalResolved).is_none() {
            return;
        }
        self.stall.stop();

        // The closing message must see the chat as it is now, not as it was
        // when the turn suspended.
        match self.surface.snapshot().await {
            Ok(snapshot) => self.last_snapshot = snapshot,
            Err(error) => {
                warn!(error = %error, "post-approval snapshot failed; using last known");
                self.publish_error(FailureClass::TransientCapability, &error.to_string());
            }
        }

        let kind = TurnKind::Resolution { approved, directive };
        if self.turn_in_flight {
            self.deferred_resolution = Some(kind);
        } else {
            self.dispatch_turn(kind, self.last_snapshot.clone());
        }
    }

    async fn handle_user_directive(&mut self, text: String) {
        if !self.phase_accepts_turns() {
            self.publish_rejection(
                SessionError::CommandUnavailable { command: "directive", phase: self.phase }
                    .to_string(),
            );
            return;
        }

        self.append_message(Sender::System, format!("Operator directive: {text}"));

        // During an approval wait the directive only enters the log; it takes
        // effect through the resolution prompt.
        if self.phase != Phase::AwaitingApproval {
            self.force_fresh_turn().await;
        }
    }

    async fn handle_user_override(&mut self, text: String) {
        if self.phase != Phase::Negotiating {
            self.publish_rejection(
                SessionError::CommandUnavailable { command: "override", phase: self.phase }
                    .to_string(),
            );
            return;
        }

        // The operator's message supersedes any queued automatic turn.
        self.timers.clear(TimerPurpose::Debounce);
        match self.chat.send_chat(&text).await {
            Ok(()) => {
                self.append_message(Sender::Agent, text);
                self.arm_watchdog();
            }
            Err(error) => {
                warn!(error = %error, "override send failed; message dropped");
                self.publish_error(FailureClass::Actuation, &error.to_string());
            }
        }
    }

    fn handle_user_typing(&mut self) {
        if !self.phase_accepts_turns() {
            return;
        }
        self.timers.clear(TimerPurpose::Debounce);
        self.timers.clear(TimerPurpose::Watchdog);
        self.timers
            .arm(TimerPurpose::TypingSuppression, self.config.timing.typing_suppression());
    }

    async fn handle_research(&mut self, query: String) {
        let Some(probe) = &self.research else {
            self.publish(UiEventKind::Error {
                class: "research_unavailable".to_owned(),
                message: "no research surface configured".to_owned(),
            });
            return;
        };
        match probe.run(&query).await {
            Ok(findings) => self.publish(UiEventKind::ResearchResult { query, findings }),
            Err(error) => {
                self.publish_error(FailureClass::TransientCapability, &error.to_string());
            }
        }
    }

    fn set_display_name(&mut self, name: String) {
        let mut context = match self.context.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        context.display_name = name;
    }

    fn on_observer_event(&mut self, event: ObserverEvent) {
        match event {
            ObserverEvent::PollFailed { message } => {
                self.publish(UiEventKind::Error {
                    class: "snapshot_poll_failed".to_owned(),
                    message,
                });
            }
            ObserverEvent::Changed { snapshot } => {
                self.last_snapshot = snapshot;
                if !self.phase_accepts_turns() {
                    return;
                }
                if self.typing_suppressed() {
                    debug!("change absorbed; user is typing");
                    return;
                }
                // Each change restarts the debounce window; only an
                // uninterrupted window dispatches a turn.
                self.timers.arm(TimerPurpose::Debounce, self.config.timing.debounce());
            }
        }
    }

    async fn on_timer_fired(&mut self, purpose: TimerPurpose) {
        self.timers.clear(purpose);

        match purpose {
            TimerPurpose::Debounce => {
                if self.typing_suppressed() {
                    return;
                }
                if let Some(kind) = self.turn_kind_for_phase() {
                    self.dispatch_turn(kind, self.last_snapshot.clone());
                }
            }
            TimerPurpose::Watchdog => {
                if self.typing_suppressed() || !self.phase_accepts_turns() {
                    return;
                }
                debug!("inactivity watchdog fired; forcing a fresh turn");
                match self.surface.snapshot().await {
                    Ok(snapshot) => self.last_snapshot = snapshot,
                    Err(error) => {
                        self.publish_error(
                            FailureClass::TransientCapability,
                            &error.to_string(),
                        );
                        self.arm_watchdog();
                        return;
                    }
                }
                let kind = match self.phase {
                    // Silence in negotiation gets a follow-up message rather
                    // than a silent wait.
                    Phase::Negotiating => TurnKind::Negotiate { nudge: true },
                    Phase::ReachingHuman => TurnKind::Contact,
                    Phase::AwaitingApproval => TurnKind::Extract,
                    _ => return,
                };
                if !self.dispatch_turn(kind, self.last_snapshot.clone()) {
                    self.arm_watchdog();
                }
            }
            TimerPurpose::TypingSuppression => {
                debug!("typing window lapsed; forcing one fresh turn");
                self.force_fresh_turn().await;
            }
        }
    }

    fn on_stall_sent(&mut self, text: String) {
        self.append_message(Sender::Agent, text);
    }

    async fn on_turn_completed(&mut self, message: TurnMessage) {
        self.turn_in_flight = false;
        self.publish(UiEventKind::ThinkingStatus { thinking: false, detail: None });

        if self.phase.is_terminal() {
            return;
        }
        if self.phase == Phase::Paused || self.typing_suppressed() {
            debug!("decision result arrived mid-paused or mid-suppressed; discarded");
            return;
        }

        match message.result {
            Ok(payload) => match (message.kind, payload) {
                (TurnKind::Contact, TurnPayload::Structured(response)) => {
                    self.complete_contact_turn(response).await;
                }
                (TurnKind::Negotiate { .. }, TurnPayload::Structured(response)) => {
                    self.complete_negotiation_turn(response).await;
                }
                (TurnKind::Extract, TurnPayload::Structured(response)) => {
                    self.complete_extraction_turn(response);
                }
                (TurnKind::Resolution { .. }, TurnPayload::Freeform(text)) => {
                    self.complete_resolution_turn(text).await;
                }
                _ => {
                    debug!("turn payload shape did not match its kind; discarded");
                    self.arm_watchdog();
                }
            },
            Err(error) => {
                // Transient capability error: this turn aborts, but timers
                // re-arm as if it completed so the session keeps moving.
                warn!(error = %error, "decision call failed; turn aborted");
                self.publish_error(FailureClass::TransientCapability, &error.to_string());
                self.arm_watchdog();
            }
        }

        // A resolution that had to wait for this call goes out now.
        if self.phase == Phase::Negotiating {
            if let Some(kind) = self.deferred_resolution.take() {
                self.dispatch_turn(kind, self.last_snapshot.clone());
            }
        }
    }

    async fn complete_contact_turn(&mut self, response: StructuredResponse) {
        if self.phase != Phase::ReachingHuman {
            debug!(phase = ?self.phase, "contact result arrived after a phase change; discarded");
            return;
        }
        let Some(decision) = parse_decision::<ContactDecision>(response, prompts::CONTACT_TOOL)
        else {
            self.publish_error(FailureClass::MalformedDecision, "contact turn had no result");
            self.arm_watchdog();
            return;
        };

        if let Some(composer_ref) = &decision.composer_ref {
            self.chat.set_composer_ref(composer_ref);
        }
        self.append_reported(decision.new_messages);

        if decision.human_detected {
            if self.apply_phase_event(PhaseEvent::HumanDetected).is_none() {
                return;
            }
            if self.skip_opening_message {
                debug!("mid-conversation session; opening message skipped");
            } else if let Some(opening) =
                decision.opening_message.filter(|text| !text.trim().is_empty())
            {
                self.send_agent_message(&opening).await;
            } else {
                warn!("human detected but no opening message supplied");
            }
        } else if let Some(action) = decision.action {
            self.execute_action(action).await;
        }

        self.arm_watchdog();
    }

    async fn complete_negotiation_turn(&mut self, response: StructuredResponse) {
        if self.phase != Phase::Negotiating {
            debug!(phase = ?self.phase, "negotiation result arrived after a phase change; discarded");
            return;
        }
        let Some(decision) =
            parse_decision::<NegotiationDecision>(response, prompts::NEGOTIATION_TOOL)
        else {
            self.publish_error(FailureClass::MalformedDecision, "negotiation turn had no result");
            self.arm_watchdog();
            return;
        };

        if let Some(composer_ref) = &decision.composer_ref {
            self.chat.set_composer_ref(composer_ref);
        }
        self.append_reported(decision.new_messages.clone());

        if decision.is_commitment {
            self.enter_awaiting_approval(decision);
        } else {
            if let Some(reply) = decision.reply.as_deref().filter(|text| !text.trim().is_empty())
            {
                self.send_agent_message(reply).await;
            }
            self.arm_watchdog();
        }
    }

    fn complete_extraction_turn(&mut self, response: StructuredResponse) {
        if self.phase != Phase::AwaitingApproval {
            debug!(phase = ?self.phase, "extraction result arrived after a phase change; discarded");
            return;
        }
        let Some(decision) =
            parse_decision::<ExtractionDecision>(response, prompts::EXTRACTION_TOOL)
        else {
            self.arm_watchdog();
            return;
        };

        self.append_reported(decision.new_messages);
        self.arm_watchdog();
    }

    async fn complete_resolution_turn(&mut self, text: String) {
        if self.phase != Phase::Negotiating {
            debug!(phase = ?self.phase, "resolution message arrived after a phase change; discarded");
            return;
        }

        let message = text.trim();
        if message.is_empty() {
            warn!("resolution turn produced an empty message");
        } else {
            self.send_agent_message(message).await;
        }
        self.arm_watchdog();
    }

    fn enter_awaiting_approval(&mut self, decision: NegotiationDecision) {
        if self.apply_phase_event(PhaseEvent::CommitmentDetected).is_none() {
            return;
        }

        let request = ApprovalRequest::from_decision(
            decision.offer_description,
            decision.remote_offer_text,
            decision.recommendation,
            decision.reasoning,
            decision.counter_suggestion,
        );
        self.publish(UiEventKind::ApprovalRequired { request: request.clone() });
        self.pending = Some(PendingApproval { request, gate: ApprovalGate::new() });

        // The turn suspends here with no timeout: only approve/reject or an
        // explicit stop release the gate. The stall scheduler keeps the
        // remote party engaged in the meantime, and extraction turns keep
        // the visible feed current.
        self.stall.start();
        self.arm_watchdog();
    }

    fn dispatch_turn(&mut self, kind: TurnKind, snapshot: String) -> bool {
        if self.turn_in_flight {
            debug!(?kind, "decision call already in flight; trigger dropped");
            return false;
        }
        self.turn_in_flight = true;
        self.publish(UiEventKind::ThinkingStatus {
            thinking: true,
            detail: Some(turn_label(&kind).to_owned()),
        });

        let tail = prompts::conversation_tail(&self.log, &snapshot);
        let brief = self.brief();
        let client = Arc::clone(&self.client);
        let turn_tx = self.turn_tx.clone();

        // The call runs to completion even if the phase changes underneath
        // it; staleness is judged when the result arrives.
        tokio::spawn(async move {
            let result = match &kind {
                TurnKind::Contact => client
                    .decide_structured(
                        &prompts::contact_prompt(&brief),
                        &tail,
                        &prompts::contact_schema(),
                    )
                    .await
                    .map(TurnPayload::Structured),
                TurnKind::Negotiate { nudge } => client
                    .decide_structured(
                        &prompts::negotiation_prompt(&brief, *nudge),
                        &tail,
                        &prompts::negotiation_schema(),
                    )
                    .await
                    .map(TurnPayload::Structured),
                TurnKind::Extract => client
                    .decide_structured(
                        &prompts::extraction_prompt(),
                        &tail,
                        &prompts::extraction_schema(),
                    )
                    .await
                    .map(TurnPayload::Structured),
                TurnKind::Resolution { approved, directive } => {
                    let prompt = if *approved {
                        prompts::acceptance_prompt(&brief)
                    } else {
                        prompts::pushback_prompt(&brief, directive.as_deref())
                    };
                    client.decide(&prompt, &tail).await.map(TurnPayload::Freeform)
                }
            };
            let _ = turn_tx.send(TurnMessage { kind, result }).await;
        });

        true
    }

    async fn force_fresh_turn(&mut self) {
        match self.surface.snapshot().await {
            Ok(snapshot) => {
                self.last_snapshot = snapshot;
                let kind = if self.phase == Phase::Negotiating {
                    self.deferred_resolution.take().or_else(|| self.turn_kind_for_phase())
                } else {
                    self.turn_kind_for_phase()
                };
                if let Some(kind) = kind {
                    self.dispatch_turn(kind, self.last_snapshot.clone());
                }
            }
            Err(error) => {
                self.publish_error(FailureClass::TransientCapability, &error.to_string());
                self.arm_watchdog();
            }
        }
    }

    async fn execute_action(&mut self, action: DecisionAction) {
        let result = match &action {
            DecisionAction::Click { element_ref } => self.surface.click(element_ref).await,
            DecisionAction::TypeText { element_ref, text } => {
                self.surface.type_text(element_ref, text).await
            }
            DecisionAction::PressKey { key } => self.surface.press_key(key).await,
        };
        if let Err(error) = result {
            warn!(error = %error, "decision action failed");
            self.publish_error(FailureClass::Actuation, &error.to_string());
        }
    }

    async fn send_agent_message(&mut self, text: &str) {
        match self.chat.send_chat(text).await {
            Ok(()) => self.append_message(Sender::Agent, text.to_owned()),
            Err(error) => {
                // Actuation failure: nothing recorded, the turn just ends.
                warn!(error = %error, "chat send failed; message dropped");
                self.publish_error(FailureClass::Actuation, &error.to_string());
            }
        }
    }

    fn append_reported(&mut self, reported: Vec<ReportedMessage>) {
        if reported.is_empty() {
            return;
        }
        let batch = reported
            .into_iter()
            .map(|message| (Sender::from(message.sender), message.text))
            .collect();
        if self.log.append_batch(batch) > 0 {
            self.publish_conversation();
        }
    }

    fn append_message(&mut self, sender: Sender, text: String) {
        self.log.append(sender, text);
        self.publish_conversation();
    }

    fn publish_conversation(&mut self) {
        match self.shared_log.write() {
            Ok(mut shared) => *shared = self.log.clone(),
            Err(poisoned) => *poisoned.into_inner() = self.log.clone(),
        }
        self.publish(UiEventKind::ConversationUpdated {
            messages: self.log.messages().to_vec(),
        });
    }

    fn apply_phase_event(&mut self, event: PhaseEvent) -> Option<PhaseTransition> {
        match self.engine.apply(self.phase, &event) {
            Ok(transition) => {
                if transition.from != transition.to {
                    self.phase = transition.to;
                    let _ = self.phase_tx.send(transition.to);
                    self.publish(UiEventKind::PhaseChanged {
                        from: transition.from,
                        to: transition.to,
                    });
                    info!(
                        from = ?transition.from,
                        to = ?transition.to,
                        actions = ?transition.actions,
                        "phase transition"
                    );
                }
                Some(transition)
            }
            Err(error) => {
                warn!(error = %error, phase = ?self.phase, "phase event rejected");
                self.publish_rejection(SessionError::from(error).to_string());
                None
            }
        }
    }

    fn arm_watchdog(&mut self) {
        if !self.phase_accepts_turns() {
            return;
        }
        // A remote party mid-composition gets a much longer leash; nothing is
        // gained by interrupting someone who is already replying.
        let interval = if suggests_remote_composing(&self.last_snapshot) {
            self.config.timing.watchdog_composing()
        } else {
            self.config.timing.watchdog()
        };
        self.timers.arm(TimerPurpose::Watchdog, interval);
    }

    fn phase_accepts_turns(&self) -> bool {
        matches!(
            self.phase,
            Phase::ReachingHuman | Phase::Negotiating | Phase::AwaitingApproval
        )
    }

    fn turn_kind_for_phase(&self) -> Option<TurnKind> {
        match self.phase {
            Phase::ReachingHuman => Some(TurnKind::Contact),
            Phase::Negotiating => Some(TurnKind::Negotiate { nudge: false }),
            Phase::AwaitingApproval => Some(TurnKind::Extract),
            _ => None,
        }
    }

    fn typing_suppressed(&self) -> bool {
        self.timers.is_armed(TimerPurpose::TypingSuppression)
    }

    fn brief(&self) -> NegotiationBrief {
        self.context_snapshot().brief
    }

    fn context_snapshot(&self) -> SessionContext {
        match self.context.read() {
            Ok(context) => context.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, kind: UiEventKind) {
        self.sink.publish(UiEvent::new(self.session_id.clone(), kind));
    }

    fn publish_error(&self, class: FailureClass, message: &str) {
        self.publish(UiEventKind::Error {
            class: class.as_str().to_owned(),
            message: message.to_owned(),
        });
    }

    fn publish_rejection(&self, message: String) {
        self.publish(UiEventKind::Error { class: "command_rejected".to_owned(), message });
    }
}

fn turn_label(kind: &TurnKind) -> &'static str {
    match kind {
        TurnKind::Contact => "reaching a human",
        TurnKind::Negotiate { nudge: false } => "negotiating",
        TurnKind::Negotiate { nudge: true } => "following up",
        TurnKind::Extract => "watching the chat",
        TurnKind::Resolution { approved: true, .. } => "accepting the offer",
        TurnKind::Resolution { approved: false, .. } => "pushing back",
    }
}

async fn wait_for_timer(entry: Option<(TimerPurpose, Instant)>) -> TimerPurpose {
    match entry {
        Some((purpose, deadline)) => {
            tokio::time::sleep_until(deadline).await;
            purpose
        }
        None => std::future::pending().await,
    }
}
