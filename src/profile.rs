//! The result type shared by both profiles' callback handlers: sign-on
//! completion and either side of a logout round-trip all flow back to the
//! host through one tagged union, so a host can handle them exhaustively at
//! a single boundary instead of juggling two unrelated return types.

/// The externally surfaced result of a successful authentication.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub relay_state: String,
}

/// Result of handling an inbound callback: a completed sign-on, or one of
/// the two logout directions.
#[derive(Debug, Clone)]
pub enum CallbackResponse {
    /// The IdP authenticated the user; `Identity` carries who they are.
    Identity(Identity),
    /// The IdP confirmed a logout this SP initiated.
    SelfInitiatedLogout { relay_url: String },
    /// The IdP asked this SP to log the user out; the browser must be sent
    /// to `redirect_url` after the SP clears its own session.
    ExternallyInitiatedLogout { redirect_url: String },
}
