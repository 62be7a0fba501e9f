use moneymate::SlipService;

use crate::auth::{CallbackSecret, JwtService};

/// Shared state handed to every handler.
pub struct AppState {
    pub service: SlipService,
    pub jwt: JwtService,
    /// When unset the callback endpoint accepts any caller.
    pub callback_secret: Option<CallbackSecret>,
}

impl AppState {
    pub fn new(
        service: SlipService,
        jwt: JwtService,
        callback_secret: Option<CallbackSecret>,
    ) -> Self {
        Self {
            service,
            jwt,
            callback_secret,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.service.policy().max_bytes
    }
}
