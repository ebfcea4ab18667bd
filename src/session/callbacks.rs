//! Lifecycle callbacks of the embedding application.

use super::SessionMode;

type Callback = Box<dyn FnOnce() + Send>;

/// Callbacks invoked when a session reaches a terminal state.
///
/// Each callback is consumed when it runs, so it can fire at most once.
#[derive(Default)]
pub struct SessionCallbacks {
    on_success: Option<Callback>,
    on_cancel: Option<Callback>,
    on_registration_complete: Option<Callback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }

    /// Runs after `on_success` for sessions in register mode.
    pub fn on_registration_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_registration_complete = Some(Box::new(f));
        self
    }

    pub(crate) fn succeed(&mut self, mode: SessionMode) {
        let on_success = self.on_success.take();
        let on_registration = self.on_registration_complete.take();
        self.on_cancel = None;

        if let Some(f) = on_success {
            f();
        }
        if mode == SessionMode::Register {
            if let Some(f) = on_registration {
                f();
            }
        }
    }

    pub(crate) fn cancel(&mut self) {
        let on_cancel = self.on_cancel.take();
        self.on_success = None;
        self.on_registration_complete = None;

        if let Some(f) = on_cancel {
            f();
        }
    }
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_registration_complete", &self.on_registration_complete.is_some())
            .finish()
    }
}
