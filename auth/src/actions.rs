//! Flow actions.
//!
//! Commands come from the user; completions are produced by effects and
//! carry the id of the operation they belong to.

use crate::connection::{BootstrapInfo, ConnectionRecord};
use crate::error::Result;
use crate::provider::ProviderConfig;
use crate::redirect::AuthResult;
use crate::results::{ProfileResult, TokenResult};
use wopi_auth_core::effect::EffectId;

/// Input to the flow reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════
    /// Run the full flow against `provider`.
    StartFlow {
        /// Provider to authenticate against.
        provider: ProviderConfig,
    },

    /// Abort the outstanding operation.
    Cancel,

    /// Exchange the connection's refresh token for new tokens.
    RefreshTokens {
        /// Owning provider.
        provider: ProviderConfig,
        /// Connection to refresh.
        connection: ConnectionRecord,
    },

    /// Repeat the profile call for the connection.
    RefreshProfile {
        /// Owning provider.
        provider: ProviderConfig,
        /// Connection to re-profile.
        connection: ConnectionRecord,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Stage completions
    // ═══════════════════════════════════════════════════════════════════════
    /// Discovery finished.
    BootstrapCompleted {
        /// Operation that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<BootstrapInfo>,
    },

    /// Sign-in finished.
    SignInCompleted {
        /// Operation that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<AuthResult>,
    },

    /// Code exchange finished.
    TokensCompleted {
        /// Operation that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<TokenResult>,
    },

    /// Profile call finished.
    ProfileCompleted {
        /// Operation that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<ProfileResult>,
    },

    /// Standalone refresh finished.
    RefreshCompleted {
        /// Operation that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<TokenResult>,
    },

    /// Standalone profile call finished.
    ReprofileCompleted {
        /// Operation that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<ProfileResult>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════════
    /// The completed flow's record was saved (or not).
    ConnectionCommitted {
        /// Commit that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<()>,
    },

    /// A refreshed or re-profiled record was saved (or not).
    ConnectionUpdated {
        /// Update that produced this.
        operation: EffectId,
        /// Outcome.
        result: Result<()>,
    },
}

impl FlowAction {
    /// The operation a completion belongs to.
    #[must_use]
    pub const fn operation(&self) -> Option<EffectId> {
        match self {
            Self::BootstrapCompleted { operation, .. }
            | Self::SignInCompleted { operation, .. }
            | Self::TokensCompleted { operation, .. }
            | Self::ProfileCompleted { operation, .. }
            | Self::RefreshCompleted { operation, .. }
            | Self::ReprofileCompleted { operation, .. }
            | Self::ConnectionCommitted { operation, .. }
            | Self::ConnectionUpdated { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// Whether this is a maintenance command or completion.
    #[must_use]
    pub const fn is_maintenance(&self) -> bool {
        matches!(
            self,
            Self::RefreshTokens { .. }
                | Self::RefreshProfile { .. }
                | Self::RefreshCompleted { .. }
                | Self::ReprofileCompleted { .. }
                | Self::ConnectionUpdated { .. }
        )
    }
}
