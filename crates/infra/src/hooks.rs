//! Pre-submission hooks.
//!
//! A hook is a pure function over a creation request. Hooks compose into a
//! chain that runs strictly in registration order, each seeing the previous
//! one's output. Auth and deadlines are attached here so the materializer
//! never has to know about them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::envelope::{CreateJobRequest, CreateTaskRequest, CreationRequest, OAuthToken, OidcToken};

/// A request mutator applied right before submission.
pub struct Hook<R> {
    f: Arc<dyn Fn(R) -> R + Send + Sync>,
}

/// Hook over task creation requests.
pub type TaskHook = Hook<CreateTaskRequest>;

/// Hook over job creation requests.
pub type JobHook = Hook<CreateJobRequest>;

impl<R: 'static> Hook<R> {
    pub fn new(f: impl Fn(R) -> R + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Returns the request unchanged.
    pub fn noop() -> Self {
        Self::new(|request| request)
    }

    /// Run `hooks` in order.
    pub fn chain(hooks: impl IntoIterator<Item = Hook<R>>) -> Self {
        let hooks: Vec<Hook<R>> = hooks.into_iter().collect();
        Self::new(move |request| hooks.iter().fold(request, |acc, hook| hook.apply(acc)))
    }

    /// `self`, then `next`.
    pub fn then(self, next: Hook<R>) -> Self {
        Self::chain([self, next])
    }

    pub fn apply(&self, request: R) -> R {
        (self.f)(request)
    }
}

impl<R> Clone for Hook<R> {
    fn clone(&self) -> Self {
        Self { f: Arc::clone(&self.f) }
    }
}

impl<R: 'static> Default for Hook<R> {
    fn default() -> Self {
        Self::noop()
    }
}

impl<R> fmt::Debug for Hook<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Attach an OIDC token (clears any OAuth token).
pub fn oidc_token<R: CreationRequest + 'static>(token: OidcToken) -> Hook<R> {
    Hook::new(move |mut request: R| {
        request.set_oidc_token(token.clone());
        request
    })
}

/// Attach an OAuth token (clears any OIDC token).
pub fn oauth_token<R: CreationRequest + 'static>(token: OAuthToken) -> Hook<R> {
    Hook::new(move |mut request: R| {
        request.set_oauth_token(token.clone());
        request
    })
}

/// Set the dispatch deadline of a task or the attempt deadline of a job.
pub fn deadline<R: CreationRequest + 'static>(deadline: Duration) -> Hook<R> {
    Hook::new(move |mut request: R| {
        request.set_deadline(deadline);
        request
    })
}
