use serde::{Deserialize, Serialize};

use kart_core::{BillingProfileId, Entity, UserId};

/// Who is asking: a signed-in user, a guest who gave an email, or nobody yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requester {
    User { user_id: UserId, email: String },
    Guest { email: String },
    Anonymous,
}

/// Identity under which billing and orders are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingProfile {
    id: BillingProfileId,
    user: Option<UserId>,
    email: Option<String>,
}

impl BillingProfile {
    pub fn new(id: BillingProfileId, user: Option<UserId>, email: Option<String>) -> Self {
        Self { id, user, email }
    }

    /// Profile matching the requester's identity, under a fresh id.
    pub fn for_requester(id: BillingProfileId, requester: &Requester) -> Self {
        match requester {
            Requester::User { user_id, email } => Self::new(id, Some(*user_id), Some(email.clone())),
            Requester::Guest { email } => Self::new(id, None, Some(email.clone())),
            Requester::Anonymous => Self::new(id, None, None),
        }
    }

    pub fn id_typed(&self) -> BillingProfileId {
        self.id
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_guest(&self) -> bool {
        self.user.is_none()
    }
}

impl Entity for BillingProfile {
    type Id = BillingProfileId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
