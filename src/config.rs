//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;
use crate::ids::{ChannelId, RoleId};

/// Onboarding workflow configuration.
///
/// Role and channel ids are guild-specific and come from the host bot's
/// settings; the defaults here only cover policy knobs.
#[derive(Debug, Clone)]
pub struct OnboardConfig {
    /// Temporary role held while an application is in flight.
    pub applicant_role: RoleId,
    /// Role granted on acceptance, alongside the language roles.
    pub member_role: RoleId,
    /// Channel holding the public welcome panel; scratch threads open here.
    pub welcome_channel: ChannelId,
    /// Channel for the public "please welcome X" post on acceptance.
    pub general_channel: ChannelId,
    /// Moderation log channel for audit notices.
    pub mod_log_channel: ChannelId,
    /// Timeout for the language and primary-language selection stages.
    pub selection_timeout: Duration,
    /// Timeout for the intake form and the more-info recapture.
    pub form_timeout: Duration,
    /// Reason used when a decline form leaves the reason blank.
    pub default_decline_reason: String,
    /// Canned reply posted by the "redirect to learning resources" action.
    pub redirect_reply: String,
}

impl OnboardConfig {
    /// Policy defaults with the given guild ids filled in.
    pub fn new(
        applicant_role: RoleId,
        member_role: RoleId,
        welcome_channel: ChannelId,
        general_channel: ChannelId,
        mod_log_channel: ChannelId,
    ) -> Self {
        Self {
            applicant_role,
            member_role,
            welcome_channel,
            general_channel,
            mod_log_channel,
            selection_timeout: Duration::from_secs(60 * 15),
            form_timeout: Duration::from_secs(60 * 10),
            default_decline_reason: "Applicant took too long to reply or does not meet \
                                     the experience criteria."
                .to_string(),
            redirect_reply: "This server is mainly about building against the game APIs. \
                             While requesting general coding help is allowed, it is not \
                             the main purpose of the server. What experience do you have \
                             with coding?"
                .to_string(),
        }
    }

    /// Sanity-check the configuration before wiring it into the workflow.
    /// Catches swapped ids and zeroed timeouts at startup instead of at the
    /// first application.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.applicant_role == self.member_role {
            return Err(ConfigError::InvalidValue {
                key: "member_role".to_string(),
                message: "must differ from applicant_role".to_string(),
            });
        }
        if self.mod_log_channel == self.general_channel {
            return Err(ConfigError::InvalidValue {
                key: "mod_log_channel".to_string(),
                message: "must differ from general_channel".to_string(),
            });
        }
        if self.selection_timeout.is_zero() || self.form_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "timeouts".to_string(),
                message: "stage timeouts must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
impl Default for OnboardConfig {
    /// Test fixture with recognizable ids.
    fn default() -> Self {
        Self::new(
            RoleId(100),
            RoleId(101),
            ChannelId(200),
            ChannelId(201),
            ChannelId(202),
        )
    }
}
