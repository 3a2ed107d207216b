//! Flow state.
//!
//! One [`FlowState`] drives one flow at a time plus the standalone refresh
//! and re-profile operations on saved connections. At most one network
//! operation is outstanding; it is recorded in [`FlowState::active`].

use crate::connection::{ConnectionBuilder, ConnectionRecord};
use crate::error::FlowError;
use crate::provider::ProviderConfig;
use std::fmt;
use wopi_auth_core::effect::EffectId;

/// Position of the flow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlowPhase {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// Waiting for the discovery call.
    Bootstrapping,
    /// Waiting for the sign-in redirect.
    SigningIn,
    /// Waiting for the code exchange.
    ExchangingTokens,
    /// Waiting for the profile call.
    FetchingProfile,
    /// All four stages completed.
    Succeeded,
    /// A stage failed.
    Failed,
    /// The user cancelled.
    Canceled,
}

impl FlowPhase {
    /// The stage this phase is waiting on.
    #[must_use]
    pub const fn stage(self) -> Option<Stage> {
        match self {
            Self::Bootstrapping => Some(Stage::Bootstrap),
            Self::SigningIn => Some(Stage::SignIn),
            Self::ExchangingTokens => Some(Stage::Tokens),
            Self::FetchingProfile => Some(Stage::Profile),
            Self::Idle | Self::Succeeded | Self::Failed | Self::Canceled => None,
        }
    }

    /// Whether a stage is running.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        self.stage().is_some()
    }

    /// Whether the flow has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// The four stages of a flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Discovery.
    Bootstrap,
    /// Interactive sign-in.
    SignIn,
    /// Code exchange.
    Tokens,
    /// Profile call.
    Profile,
}

impl Stage {
    /// Every stage in flow order.
    pub const ALL: [Self; 4] = [Self::Bootstrap, Self::SignIn, Self::Tokens, Self::Profile];

    /// One-based stage number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Bootstrap => 1,
            Self::SignIn => 2,
            Self::Tokens => 3,
            Self::Profile => 4,
        }
    }

    /// Label used in log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bootstrap => "Bootstrapper",
            Self::SignIn => "Signin",
            Self::Tokens => "Tokens",
            Self::Profile => "Profile",
        }
    }

    /// Phase while this stage runs.
    #[must_use]
    pub const fn phase(self) -> FlowPhase {
        match self {
            Self::Bootstrap => FlowPhase::Bootstrapping,
            Self::SignIn => FlowPhase::SigningIn,
            Self::Tokens => FlowPhase::ExchangingTokens,
            Self::Profile => FlowPhase::FetchingProfile,
        }
    }

    const fn index(self) -> usize {
        self.number() as usize - 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.number(), self.label())
    }
}

/// Status of one stage for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageStatus {
    /// Not started.
    #[default]
    Pending,
    /// In flight.
    Running,
    /// Completed.
    Succeeded,
    /// Failed.
    Failed,
    /// Cancelled while running.
    Canceled,
}

/// Per-stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageBoard {
    statuses: [StageStatus; 4],
}

impl StageBoard {
    /// Status of `stage`.
    #[must_use]
    pub const fn get(&self, stage: Stage) -> StageStatus {
        self.statuses[stage.index()]
    }

    /// Set the status of `stage`.
    pub const fn set(&mut self, stage: Stage, status: StageStatus) {
        self.statuses[stage.index()] = status;
    }

    /// Every stage back to pending.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Stages with their status, in order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, StageStatus)> + '_ {
        Stage::ALL.into_iter().map(|stage| (stage, self.get(stage)))
    }
}

/// What the outstanding operation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A stage of the full flow.
    Flow(Stage),
    /// Standalone token refresh.
    Refresh,
    /// Standalone profile call.
    Reprofile,
}

/// The single outstanding network operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveOperation {
    /// Cancellation id of the effect.
    pub id: EffectId,
    /// What it is doing.
    pub kind: OperationKind,
}

/// Which standalone operation last ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceKind {
    /// Token refresh.
    Refresh,
    /// Profile call.
    Reprofile,
}

impl MaintenanceKind {
    /// The matching operation kind.
    #[must_use]
    pub const fn operation(self) -> OperationKind {
        match self {
            Self::Refresh => OperationKind::Refresh,
            Self::Reprofile => OperationKind::Reprofile,
        }
    }
}

/// Outcome of the last standalone operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaintenanceStatus {
    /// None has run.
    #[default]
    Idle,
    /// In flight.
    Running,
    /// Completed; the update is handed to persistence.
    Succeeded,
    /// The call failed; the connection is unchanged.
    Failed,
    /// Cancelled while running.
    Canceled,
    /// Refused before any network call.
    Rejected,
}

impl MaintenanceStatus {
    /// Whether the operation has finished.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// State of the standalone refresh / re-profile operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaintenanceState {
    /// Outcome of the last operation.
    pub status: MaintenanceStatus,
    /// Which operation.
    pub kind: Option<MaintenanceKind>,
    /// Provider of the connection being worked on.
    pub provider: Option<ProviderConfig>,
    /// The connection as it was before the operation.
    pub target: Option<ConnectionRecord>,
    /// The connection after a successful operation.
    pub updated: Option<ConnectionRecord>,
    /// Why the last operation failed or was rejected.
    pub last_error: Option<FlowError>,
    /// Whether the update was persisted.
    pub persisted: bool,
    /// Why persisting the update failed.
    pub persist_error: Option<FlowError>,
    /// Update whose result is awaited.
    pub pending_update: Option<EffectId>,
}

/// Everything the flow reducer knows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowState {
    /// Position of the full flow.
    pub phase: FlowPhase,
    /// Per-stage status for display.
    pub stages: StageBoard,
    /// Provider of the current or last flow.
    pub provider: Option<ProviderConfig>,
    /// Record under construction.
    pub connection: Option<ConnectionBuilder>,
    /// Completed record of the last successful flow.
    pub record: Option<ConnectionRecord>,
    /// Outstanding network operation.
    pub active: Option<ActiveOperation>,
    /// Why the last flow failed.
    pub last_error: Option<FlowError>,
    /// Whether the completed record was persisted.
    pub committed: bool,
    /// Why persisting the completed record failed.
    pub commit_error: Option<FlowError>,
    /// Commit whose result is awaited.
    pub pending_commit: Option<EffectId>,
    /// Standalone operations.
    pub maintenance: MaintenanceState,
    last_operation: EffectId,
}

impl FlowState {
    /// A fresh, idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for the next operation.
    pub const fn next_operation_id(&mut self) -> EffectId {
        self.last_operation = self.last_operation.next();
        self.last_operation
    }

    /// Whether `operation` is the outstanding one.
    #[must_use]
    pub fn is_active(&self, operation: EffectId) -> bool {
        self.active.is_some_and(|active| active.id == operation)
    }

    /// Whether any network operation is outstanding.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Whether nothing is running and no commit is pending.
    ///
    /// Used by callers that wait for a flow or operation to finish.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        if self.active.is_some() {
            return false;
        }
        let flow_settled = match self.phase {
            FlowPhase::Succeeded => self.committed || self.commit_error.is_some(),
            phase => !phase.is_in_progress(),
        };
        let maintenance_settled = match self.maintenance.status {
            MaintenanceStatus::Succeeded => {
                self.maintenance.persisted || self.maintenance.persist_error.is_some()
            }
            status => status.is_settled(),
        };
        flow_settled && maintenance_settled
    }
}
