use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PREMIUM_PLANS: &[&str] = &["sixMonth", "quarterly", "premium", "monthly"];
const PREMIUM_INTERVIEW_PLANS: &[&str] = &["pro", "interview_gyani"];

/// Correlates service-side quota and logging for one practice session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub session_id: Uuid,
    pub user_id: Option<String>,
}

impl SessionIdentity {
    pub fn new(session_id: Uuid, user_id: Option<String>) -> Self {
        let user_id = user_id.filter(|id| !id.trim().is_empty());
        Self {
            session_id,
            user_id,
        }
    }

    /// The id sent to the service: the signed-in user, or `guest_<session id>`.
    pub fn effective_user_id(&self) -> String {
        match &self.user_id {
            Some(id) => id.clone(),
            None => format!("guest_{}", self.session_id),
        }
    }
}

/// Plan fields of the signed-in user, as resolved by the auth layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub interview_plan: Option<String>,
    #[serde(default)]
    pub has_interview_kit: bool,
}

/// Whether the user may start or continue a practice session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub interview_premium: bool,
}

impl Entitlement {
    pub fn from_plan(plan: &PlanInfo) -> Self {
        let premium_plan = plan
            .plan
            .as_deref()
            .is_some_and(|p| PREMIUM_PLANS.contains(&p));
        let premium_interview = plan
            .interview_plan
            .as_deref()
            .is_some_and(|p| PREMIUM_INTERVIEW_PLANS.contains(&p));

        Self {
            interview_premium: premium_plan || premium_interview || plan.has_interview_kit,
        }
    }

    pub fn allows_practice(&self) -> bool {
        self.interview_premium
    }
}
