//! Negotiation sessions between workers
//!
//! A session is a bounded multi-round exchange between two or more workers
//! aimed at a single agreed proposal. The agreement rule is pluggable; the
//! default is strict structural equality of every participant's latest
//! proposal. Timeout expiry is driven by the coordinator's monitoring tick,
//! never by per-session timers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::events::{EngineEvent, EventBus};
use super::registry::WorkerRegistry;
use super::{CoordinationError, CoordinationResult};

/// Status of a negotiation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Open for proposals
    Pending,
    /// Consensus reached; `final_agreement` is set
    Agreed,
    /// Majority fallback ran and did not find enough acceptances
    Disagreed,
    /// Expired without consensus
    Timeout,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Pending => "pending",
            NegotiationStatus::Agreed => "agreed",
            NegotiationStatus::Disagreed => "disagreed",
            NegotiationStatus::Timeout => "timeout",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NegotiationStatus::Pending)
    }
}

impl std::str::FromStr for NegotiationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NegotiationStatus::Pending),
            "agreed" => Ok(NegotiationStatus::Agreed),
            "disagreed" => Ok(NegotiationStatus::Disagreed),
            "timeout" => Ok(NegotiationStatus::Timeout),
            _ => Err(format!("Invalid negotiation status: {}", s)),
        }
    }
}

/// One entry in a session's proposal log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub worker_id: String,
    pub proposal: Value,
    pub reasoning: String,
    /// Explicit acceptance flag, consulted only by the majority fallback
    pub accept: bool,
    pub submitted_at: DateTime<Utc>,
}

/// A negotiation session between two or more workers
#[derive(Debug, Clone, Serialize)]
pub struct NegotiationSession {
    pub id: Uuid,
    pub initiator: String,
    pub participants: Vec<String>,
    pub topic: String,
    pub proposals: Vec<Proposal>,
    pub status: NegotiationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_agreement: Option<Value>,
    pub created_at: DateTime<Utc>,
    /// When the session expires if still Pending
    pub deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl NegotiationSession {
    pub fn is_participant(&self, worker_id: &str) -> bool {
        self.participants.iter().any(|p| p == worker_id)
    }

    /// The most recent proposal from each participant that has proposed
    pub fn latest_proposals(&self) -> HashMap<&str, &Proposal> {
        let mut latest = HashMap::new();
        for proposal in &self.proposals {
            latest.insert(proposal.worker_id.as_str(), proposal);
        }
        latest
    }
}

/// Pluggable agreement rule, run after every proposal
pub trait ResolutionStrategy: Send + Sync {
    /// Return the agreed value if the session has converged
    fn resolve(&self, session: &NegotiationSession) -> Option<Value>;
}

/// Default rule: every participant's latest proposal is structurally
/// identical. Partial overlap never resolves a session.
pub struct StrictEquality;

impl ResolutionStrategy for StrictEquality {
    fn resolve(&self, session: &NegotiationSession) -> Option<Value> {
        let latest = session.latest_proposals();
        if latest.len() < session.participants.len() {
            return None;
        }
        let mut values = latest.values().map(|p| &p.proposal);
        let first = values.next()?;
        if values.all(|v| v == first) {
            Some(first.clone())
        } else {
            None
        }
    }
}

/// Negotiation behavior knobs
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// How long a session may stay Pending
    pub timeout: Duration,
    /// Apply the majority-acceptance rule on expiry instead of timing out.
    /// Off by default; enabling it is an explicit configuration decision.
    pub majority_fallback: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            majority_fallback: false,
        }
    }
}

/// Manages negotiation sessions independently of task execution
pub struct NegotiationManager {
    registry: Arc<WorkerRegistry>,
    sessions: RwLock<HashMap<Uuid, NegotiationSession>>,
    config: NegotiationConfig,
    strategy: Box<dyn ResolutionStrategy>,
    events: EventBus,
}

impl NegotiationManager {
    pub fn new(registry: Arc<WorkerRegistry>, config: NegotiationConfig, events: EventBus) -> Self {
        Self::with_strategy(registry, config, events, Box::new(StrictEquality))
    }

    pub fn with_strategy(
        registry: Arc<WorkerRegistry>,
        config: NegotiationConfig,
        events: EventBus,
        strategy: Box<dyn ResolutionStrategy>,
    ) -> Self {
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
            config,
            strategy,
            events,
        }
    }

    /// Open a session between `participants` (which must include the
    /// initiator) and notify them
    pub async fn initiate(
        &self,
        initiator: &str,
        participants: Vec<String>,
        topic: &str,
    ) -> CoordinationResult<NegotiationSession> {
        let mut unique: Vec<String> = Vec::new();
        for p in participants {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }

        if unique.len() < 2 {
            return Err(CoordinationError::InvalidNegotiation(
                "a negotiation needs at least 2 participants".to_string(),
            ));
        }
        if !unique.iter().any(|p| p == initiator) {
            return Err(CoordinationError::InvalidNegotiation(format!(
                "initiator {:?} is not among the participants",
                initiator
            )));
        }
        for p in &unique {
            if self.registry.get(p).await.is_none() {
                return Err(CoordinationError::WorkerNotFound(p.clone()));
            }
        }

        let now = Utc::now();
        let session = NegotiationSession {
            id: Uuid::new_v4(),
            initiator: initiator.to_string(),
            participants: unique.clone(),
            topic: topic.to_string(),
            proposals: Vec::new(),
            status: NegotiationStatus::Pending,
            final_agreement: None,
            created_at: now,
            deadline: now
                + chrono::Duration::from_std(self.config.timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            resolved_at: None,
        };

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.id, session.clone());
        }

        self.registry.set_negotiating(&unique, true).await;
        self.events.emit(EngineEvent::NegotiationInitiated {
            session_id: session.id,
            initiator: session.initiator.clone(),
            participants: unique,
            topic: session.topic.clone(),
        });

        Ok(session)
    }

    /// Append a proposal and run the agreement rule
    pub async fn propose(
        &self,
        session_id: Uuid,
        worker_id: &str,
        proposal: Value,
        reasoning: impl Into<String>,
        accept: bool,
    ) -> CoordinationResult<NegotiationSession> {
        let (snapshot, resolved) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(CoordinationError::UnknownSession(session_id))?;

            if session.status.is_terminal() {
                return Err(CoordinationError::SessionClosed(session_id));
            }
            if !session.is_participant(worker_id) {
                return Err(CoordinationError::NotAParticipant {
                    session_id,
                    worker_id: worker_id.to_string(),
                });
            }

            session.proposals.push(Proposal {
                worker_id: worker_id.to_string(),
                proposal,
                reasoning: reasoning.into(),
                accept,
                submitted_at: Utc::now(),
            });

            let resolved = if let Some(agreement) = self.strategy.resolve(session) {
                session.status = NegotiationStatus::Agreed;
                session.final_agreement = Some(agreement);
                session.resolved_at = Some(Utc::now());
                true
            } else {
                false
            };

            (session.clone(), resolved)
        };

        self.events.emit(EngineEvent::ProposalSubmitted {
            session_id,
            worker_id: worker_id.to_string(),
        });
        if resolved {
            self.release(&snapshot).await;
        }

        Ok(snapshot)
    }

    /// Get a session snapshot by id
    pub async fn get(&self, session_id: Uuid) -> Option<NegotiationSession> {
        let sessions = self.sessions.read().await;
        sessions.get(&session_id).cloned()
    }

    /// Number of sessions still Pending
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.status == NegotiationStatus::Pending)
            .count()
    }

    /// Expire every Pending session whose deadline has passed
    ///
    /// Called from the coordinator's monitoring tick. Returns the ids of
    /// sessions resolved by this call.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut resolved = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if session.status != NegotiationStatus::Pending || session.deadline > now {
                    continue;
                }

                if self.config.majority_fallback {
                    let (acceptances, agreement) = {
                        let latest = session.latest_proposals();
                        let acceptances = latest.values().filter(|p| p.accept).count();
                        // the most recent accepted proposal carries the
                        // agreement
                        let agreement = latest
                            .values()
                            .filter(|p| p.accept)
                            .max_by_key(|p| p.submitted_at)
                            .map(|p| p.proposal.clone());
                        (acceptances, agreement)
                    };
                    if 2 * acceptances >= session.participants.len() {
                        session.final_agreement = agreement;
                        session.status = NegotiationStatus::Agreed;
                    } else {
                        session.status = NegotiationStatus::Disagreed;
                    }
                } else {
                    session.status = NegotiationStatus::Timeout;
                }
                session.resolved_at = Some(now);
                resolved.push(session.id);
            }
        }

        for id in &resolved {
            if let Some(session) = self.get(*id).await {
                self.release(&session).await;
            }
        }
        resolved
    }

    async fn release(&self, session: &NegotiationSession) {
        self.registry
            .set_negotiating(&session.participants, false)
            .await;
        self.events.emit(EngineEvent::NegotiationResolved {
            session_id: session.id,
            status: session.status,
        });
    }
}
