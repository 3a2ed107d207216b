//! Flow reducers.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.

pub mod flow;
pub mod maintenance;

use crate::actions::FlowAction;
use crate::environment::FlowEnvironment;
use crate::providers::{PreferenceStore, SignInSurface, WopiEndpoints};
use crate::state::{FlowState, OperationKind};
use wopi_auth_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

// Re-export
pub use flow::FlowReducer;
pub use maintenance::MaintenanceReducer;

/// Combined reducer.
///
/// Routes full-flow actions to [`FlowReducer`] and refresh / re-profile
/// actions to [`MaintenanceReducer`]. `Cancel` goes to whichever owns the
/// active operation.
#[derive(Debug)]
pub struct WopiReducer<W, S, P> {
    flow: FlowReducer<W, S, P>,
    maintenance: MaintenanceReducer<W, S, P>,
}

impl<W, S, P> WopiReducer<W, S, P> {
    /// Create the combined reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flow: FlowReducer::new(),
            maintenance: MaintenanceReducer::new(),
        }
    }
}

impl<W, S, P> Default for WopiReducer<W, S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, S, P> Clone for WopiReducer<W, S, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<W, S, P> Reducer for WopiReducer<W, S, P>
where
    W: WopiEndpoints + Clone + 'static,
    S: SignInSurface + Clone + 'static,
    P: PreferenceStore + Clone + 'static,
{
    type State = FlowState;
    type Action = FlowAction;
    type Environment = FlowEnvironment<W, S, P>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            FlowAction::Cancel => match state.active.map(|active| active.kind) {
                Some(OperationKind::Flow(_)) => self.flow.reduce(state, action, env),
                Some(OperationKind::Refresh | OperationKind::Reprofile) => {
                    self.maintenance.reduce(state, action, env)
                }
                None => {
                    env.log.warning("Nothing to cancel");
                    smallvec![Effect::None]
                }
            },
            action if action.is_maintenance() => self.maintenance.reduce(state, action, env),
            action => self.flow.reduce(state, action, env),
        }
    }
}
